/*!
 * Static capability descriptors.
 *
 * One descriptor exists per property or action name per device type; they
 * never change after construction and travel inside `description`
 * messages.
 */
use serde::{Deserialize, Serialize};

/// Metadata describing one device property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name, unique within the device
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the property can be read
    #[serde(default = "default_true")]
    pub readable: bool,
    /// Whether the property can be written
    #[serde(default)]
    pub mutable: bool,
}

fn default_true() -> bool {
    true
}

impl PropertyDescriptor {
    /// A readable, immutable property descriptor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            readable: true,
            mutable: false,
        }
    }

    /// Set the human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the property writable
    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }
}

/// Metadata describing one device action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Action name, unique within the device
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActionDescriptor {
    /// A descriptor for the named action
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    /// Set the human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
