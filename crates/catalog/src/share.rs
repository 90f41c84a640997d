//! One configured entry point for producing and restoring share links.

use crate::config::ShareConfig;
use crate::deserialize::{ApplyOptions, apply_share_state};
use crate::error::{CatalogError, ShareReport};
use crate::registry::TypeRegistry;
use crate::serialize::serialize_share_map;
use crate::tree::CatalogTree;
use crate::url_codec::{self, DecodedShare, SharePayload};
use crate::whitelist::{AmbientWhitelist, PropertyWhitelist, UserProperties};

#[derive(Debug, Clone)]
pub struct ShareContext {
    config: ShareConfig,
    properties: PropertyWhitelist,
    ambient: AmbientWhitelist,
}

impl Default for ShareContext {
    fn default() -> Self {
        Self::from_config(ShareConfig::default())
    }
}

impl ShareContext {
    pub fn from_config(config: ShareConfig) -> Self {
        let properties = config.property_whitelist();
        let ambient = config.ambient_whitelist();
        Self {
            config,
            properties,
            ambient,
        }
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    pub fn properties(&self) -> &PropertyWhitelist {
        &self.properties
    }

    pub fn ambient(&self) -> &AmbientWhitelist {
        &self.ambient
    }

    pub fn payload(&self, tree: &CatalogTree) -> SharePayload {
        SharePayload {
            version: self.config.version.clone(),
            init_urls: self.config.init_urls.clone(),
            shared: serialize_share_map(tree, &self.properties),
            extra: Vec::new(),
        }
    }

    pub fn share_url(
        &self,
        tree: &CatalogTree,
        user_properties: &UserProperties,
    ) -> Result<String, CatalogError> {
        let payload = self.payload(tree);
        tracing::debug!(members = payload.shared.len(), "encoding share link");
        url_codec::encode_share_url(&self.config.base_url, &payload, user_properties, &self.ambient)
    }

    pub fn embed_code(
        &self,
        tree: &CatalogTree,
        user_properties: &UserProperties,
    ) -> Result<String, CatalogError> {
        self.share_url(tree, user_properties)
            .map(|url| url_codec::embed_code(&url))
    }

    /// Accepts a share URL or an embed snippet.
    pub fn decode(&self, link: &str) -> Result<DecodedShare, CatalogError> {
        url_codec::decode_share_url(link, &self.ambient)
    }

    /// Decodes `link` and applies it to `tree` and `user_store`.
    ///
    /// A malformed link fails before either is touched.
    pub async fn restore(
        &self,
        link: &str,
        tree: &mut CatalogTree,
        registry: &TypeRegistry,
        user_store: &mut UserProperties,
        options: ApplyOptions,
    ) -> Result<ShareReport, CatalogError> {
        let decoded = self.decode(link)?;
        if let Some(payload) = &decoded.payload
            && payload.version != self.config.version
        {
            tracing::debug!(
                link_version = %payload.version,
                "share link version differs from {}",
                self.config.version
            );
        }
        let report = apply_share_state(
            tree,
            &decoded.state(),
            registry,
            user_store,
            &self.ambient,
            options,
        )
        .await?;
        tracing::info!(
            applied = report.applied.len(),
            created = report.created.len(),
            errors = report.errors.len(),
            "share link restored"
        );
        Ok(report)
    }
}
