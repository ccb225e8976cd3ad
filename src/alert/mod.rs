//! Side effects raised when the order alert toast appears.

pub mod tone;

#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

pub use tone::Tone;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert output unavailable: {0}")]
    Unavailable(String),
}

/// Desktop notification permission, as decided by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Not asked yet
    Default,
    Granted,
    Denied,
}

impl Permission {
    pub fn from_str(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "granted" => Permission::Granted,
            "denied" => Permission::Denied,
            _ => Permission::Default,
        }
    }
}

/// Native OS notification content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesktopNotice {
    pub title: String,
    pub body: String,
    /// Notices sharing a tag replace each other
    pub tag: String,
    pub require_interaction: bool,
}

#[cfg_attr(test, automock)]
pub trait AudioOutput: Send + Sync {
    fn play(&self, tone: &Tone) -> Result<(), AlertError>;
}

#[cfg_attr(test, automock)]
pub trait DesktopNotifier: Send + Sync {
    fn permission(&self) -> Permission;

    /// Ask the user; the answer arrives later through `permission()`
    fn request_permission(&self);

    fn show(&self, notice: &DesktopNotice) -> Result<(), AlertError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_parsing() {
        assert_eq!(Permission::from_str("granted"), Permission::Granted);
        assert_eq!(Permission::from_str("DENIED"), Permission::Denied);
        assert_eq!(Permission::from_str("default"), Permission::Default);
        assert_eq!(Permission::from_str(""), Permission::Default);
    }

    #[test]
    fn test_permission_wire_names() {
        assert_eq!(
            serde_json::to_string(&Permission::Granted).unwrap(),
            r#""granted""#
        );
    }
}
