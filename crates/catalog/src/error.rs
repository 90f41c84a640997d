use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown catalog member type: {tag}")]
    UnknownType { tag: String },

    #[error("no url matcher accepted {url}")]
    NoMatch { url: String },

    #[error("share address does not resolve in the catalog: {address}")]
    DanglingReference { address: String },

    #[error("malformed share payload: {0}")]
    MalformedPayload(String),

    #[error("invalid catalog definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid value for `{property}` on {address}: {reason}")]
    InvalidProperty {
        address: String,
        property: String,
        reason: String,
    },

    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid share url: {0}")]
    Url(#[from] url::ParseError),
}

impl CatalogError {
    /// Structural errors abort the whole operation; everything else is local
    /// to a single member and gets aggregated into a [`ShareReport`].
    pub fn is_structural(&self) -> bool {
        matches!(self, CatalogError::MalformedPayload(_) | CatalogError::Url(_))
    }
}

/// A per-member failure collected while walking or rebuilding a tree.
#[derive(Debug)]
pub struct MemberFailure {
    pub address: String,
    pub error: CatalogError,
}

/// Outcome of applying a share map (or a catalog definition) to a tree.
#[derive(Debug, Default)]
pub struct ShareReport {
    /// Addresses merged into members that already existed.
    pub applied: Vec<String>,
    /// Addresses that had to be constructed through the registry.
    pub created: Vec<String>,
    /// Addresses skipped without touching the tree.
    pub skipped: Vec<String>,
    pub errors: Vec<MemberFailure>,
}

impl ShareReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.skipped.is_empty()
    }

    pub fn push_error(&mut self, address: impl Into<String>, error: CatalogError) {
        self.errors.push(MemberFailure {
            address: address.into(),
            error,
        });
    }

    pub fn dangling(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().filter_map(|f| match &f.error {
            CatalogError::DanglingReference { address } => Some(address.as_str()),
            _ => None,
        })
    }
}
