//! Per-field value resolution against one item element

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::{Access, SelectorSpec};
use crate::traits::PageSurface;

/// Why a single field came out absent
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("no descendant matches `{0}`")]
    NoElement(String),
    #[error(transparent)]
    Surface(#[from] anyhow::Error),
}

/// Resolve one field, turning any failure into an absent value.
///
/// Failures are logged and never leave this function, so one broken
/// selector cannot take down the rest of the record or the page.
pub async fn resolve<S: PageSurface>(
    surface: &mut S,
    item: &S::Element,
    spec: &SelectorSpec,
) -> Option<String> {
    match try_resolve(surface, item, spec).await {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to resolve field {}: {}", spec.name, e);
            None
        }
    }
}

/// Resolve one field. `Ok(None)` is a clean miss: an absent property or no
/// candidate word found.
pub async fn try_resolve<S: PageSurface>(
    surface: &mut S,
    item: &S::Element,
    spec: &SelectorSpec,
) -> Result<Option<String>, FieldError> {
    match &spec.access {
        Access::Nested { path } => {
            let value = surface.read_property(item, path).await?;
            Ok(raw_value(value))
        }
        Access::Match {
            sub_selector,
            property,
            candidates,
        } => {
            let path = std::slice::from_ref(property);
            for element in surface.query_within(item, sub_selector).await? {
                let Some(text) = raw_value(surface.read_property(&element, path).await?) else {
                    continue;
                };
                if candidates.iter().any(|word| text.contains(word.as_str())) {
                    return Ok(Some(text.trim().to_string()));
                }
            }
            Ok(None)
        }
        Access::Direct {
            property,
            sub_selector: None,
        } => {
            let value = surface
                .read_property(item, std::slice::from_ref(property))
                .await?;
            Ok(text_value(value))
        }
        Access::Direct {
            property,
            sub_selector: Some(sub_selector),
        } => {
            let element = surface
                .query_within(item, sub_selector)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| FieldError::NoElement(sub_selector.clone()))?;
            let value = surface
                .read_property(&element, std::slice::from_ref(property))
                .await?;
            Ok(text_value(value))
        }
    }
}

/// Free text: strings are trimmed, other scalars rendered as-is
fn text_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        other => raw_value(other),
    }
}

/// Structured results are rendered verbatim, never trimmed
fn raw_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
