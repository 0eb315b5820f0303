//! Loader for message template overrides.

use crate::templates::MessageTemplates;
use concierge_core::{AppError, AppResult};
use std::path::Path;

/// Load message templates from a YAML file.
///
/// Fields missing from the file keep their built-in values. A `replies` map
/// in the file is merged into the built-in one rather than replacing it.
/// Reply keys must name a known sensitive category.
///
/// # Example
/// ```no_run
/// use concierge_notify::{load_templates, SensitiveCategory};
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let templates = load_templates(Path::new(".concierge/templates.yaml"))?;
/// println!("{}", templates.handoff_reply(&[SensitiveCategory::Discount]));
/// # Ok(())
/// # }
/// ```
pub fn load_templates(path: &Path) -> AppResult<MessageTemplates> {
    tracing::debug!("Loading message templates from: {:?}", path);

    if !path.exists() {
        return Err(AppError::Template(format!(
            "Template file not found: {:?}",
            path
        )));
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Template(format!("Failed to read template file {:?}: {}", path, e))
    })?;

    let overrides: MessageTemplates = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Template(format!("Failed to parse template YAML {:?}: {}", path, e))
    })?;

    let mut templates = MessageTemplates::default();
    templates.notification = overrides.notification;
    templates.replies.extend(overrides.replies);
    templates.reply_order = overrides.reply_order;
    templates.default_reply = overrides.default_reply;
    templates.user_label = overrides.user_label;
    templates.assistant_label = overrides.assistant_label;

    validate_templates(&templates)?;

    tracing::info!(
        "Loaded message templates ({} category replies)",
        templates.replies.len()
    );

    Ok(templates)
}

/// Validate that templates are usable.
fn validate_templates(templates: &MessageTemplates) -> AppResult<()> {
    if templates.notification.trim().is_empty() {
        return Err(AppError::Template(
            "Notification template must not be empty".to_string(),
        ));
    }

    if templates.default_reply.trim().is_empty() {
        return Err(AppError::Template(
            "Default reply must not be empty".to_string(),
        ));
    }

    Ok(())
}
