use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::whitelist::{AmbientWhitelist, DEFAULT_USER_PROPERTIES, PropertyWhitelist};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/";
pub const SHARE_VERSION: &str = "0.0.05";

/// Share-link settings, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShareConfig {
    /// Page the share fragment is appended to.
    pub base_url: String,
    pub version: String,
    /// Catalog init sources listed ahead of the shared members.
    pub init_urls: Vec<String>,
    pub user_prop_whitelist: Vec<String>,
    pub extra_user_props: Vec<String>,
    /// Type tag -> additional shareable property names.
    pub shareable_properties: BTreeMap<String, Vec<String>>,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            version: SHARE_VERSION.to_string(),
            init_urls: Vec::new(),
            user_prop_whitelist: DEFAULT_USER_PROPERTIES
                .iter()
                .map(|k| k.to_string())
                .collect(),
            extra_user_props: Vec::new(),
            shareable_properties: BTreeMap::new(),
        }
    }
}

impl ShareConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let payload = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&payload)
    }

    pub fn from_json(payload: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(payload)
            .map_err(|e| CatalogError::InvalidDefinition(format!("share config: {e}")))
    }

    pub fn ambient_whitelist(&self) -> AmbientWhitelist {
        let mut whitelist = AmbientWhitelist::new(self.user_prop_whitelist.iter().cloned());
        whitelist.extend(self.extra_user_props.iter().cloned());
        whitelist
    }

    pub fn property_whitelist(&self) -> PropertyWhitelist {
        let mut whitelist = PropertyWhitelist::default();
        for (type_tag, keys) in &self.shareable_properties {
            for key in keys {
                whitelist.allow_for_type(type_tag.clone(), key.clone());
            }
        }
        whitelist
    }
}
