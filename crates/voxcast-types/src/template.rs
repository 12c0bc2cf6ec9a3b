//! Message template parsing and per-contact substitution.
//!
//! Templates use `{{variable}}` syntax. `{{name}}` and `{{phone}}` resolve
//! from the contact itself; anything else resolves from the contact's
//! custom fields. Unknown variables render as an empty string so a sparse
//! contact list never breaks synthesis.

use crate::call::Contact;
use thiserror::Error;

/// Errors raised while validating a template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template cannot be empty")]
    Empty,

    #[error("unterminated variable starting at byte {0}")]
    Unterminated(usize),

    #[error("invalid variable name '{0}'")]
    InvalidVariable(String),
}

/// Checks that every `{{…}}` block is closed and names a valid variable.
///
/// Variable names are non-empty `[A-Za-z0-9_]+`.
pub fn validate(template: &str) -> Result<(), TemplateError> {
    if template.trim().is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut rest = template;
    let mut offset = 0usize;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(TemplateError::Unterminated(offset + open));
        };
        let name = &after[..close];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TemplateError::InvalidVariable(name.to_string()));
        }
        offset += open + 2 + close + 2;
        rest = &after[close + 2..];
    }

    Ok(())
}

/// Renders `template` against a contact.
///
/// The caller is expected to have validated the template at campaign
/// creation; a malformed block at this point is emitted verbatim.
pub fn render(template: &str, contact: &Contact) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let name = &after[..close];
                out.push_str(&resolve(name, contact));
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve(name: &str, contact: &Contact) -> String {
    match name {
        "name" => contact.name.clone(),
        "phone" => contact.phone.clone(),
        _ => match contact.custom_fields.get(name) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
    }
}
