//! Inspector configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Options controlling how a property tree is built and shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Group root-level properties under category nodes
    pub show_categories: bool,
    /// Sort children by name
    pub sorted: bool,
    /// Sort by declared order index instead of by name
    pub use_script_defined_order: bool,
    /// Also show properties without the edit flag
    pub show_non_editable: bool,
    /// Levels below the root that are built; `None` is unlimited
    pub max_child_depth: Option<u32>,
    /// Expand categories when no layout has been saved for the type
    pub expand_categories_by_default: bool,
    /// Refuse every value edit
    pub read_only: bool,
    /// Share expanded paths with super types up to, but excluding, this type
    pub layout_root_type: Option<String>,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            show_categories: true,
            sorted: true,
            use_script_defined_order: false,
            show_non_editable: false,
            max_child_depth: None,
            expand_categories_by_default: true,
            read_only: false,
            layout_root_type: None,
        }
    }
}

impl InspectorConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = InspectorConfig::from_json_str(r#"{"sorted": false, "max_child_depth": 3}"#).unwrap();

        assert!(!config.sorted);
        assert_eq!(config.max_child_depth, Some(3));
        assert!(config.show_categories);
        assert!(config.expand_categories_by_default);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        assert!(matches!(
            InspectorConfig::from_json_str("[1, 2]"),
            Err(crate::Error::Serialization(_))
        ));
    }
}
