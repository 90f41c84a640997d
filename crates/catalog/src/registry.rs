//! Type registry: maps a type tag, or a URL, to a member factory.
//!
//! The registry is an explicit value built during application start-up and
//! then shared by reference with every loader and share-link decoder.
//! Registration takes `&mut self`, so it naturally completes before any
//! `create` call borrows the registry.
//!
//! URL matchers are evaluated strictly in registration order. Register the
//! specific predicates first and the catch-all (see [`match_all`]) last.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::CatalogError;
use crate::member::{
    CatalogGroup, CatalogItem, CatalogMember, NAME_KEY, Properties, TYPE_KEY, URL_KEY,
};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type UrlPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Everything a factory needs to build one member.
#[derive(Debug, Clone)]
pub struct MemberInit {
    pub type_tag: String,
    /// The member's definition object, minus its `items`.
    pub definition: Properties,
}

/// Constructs catalog members of one or more type tags.
///
/// Creation may suspend (a loader fetching remote metadata, say), so it
/// returns a boxed future for dyn-compatibility.
pub trait MemberFactory: Send + Sync {
    fn create(&self, init: MemberInit) -> BoxFuture<'_, Result<CatalogMember, CatalogError>>;
}

/// Builds a plain [`CatalogGroup`] from its definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupFactory;

impl MemberFactory for GroupFactory {
    fn create(&self, init: MemberInit) -> BoxFuture<'_, Result<CatalogMember, CatalogError>> {
        Box::pin(async move {
            CatalogGroup::from_definition(&init.type_tag, &init.definition).map(CatalogMember::Group)
        })
    }
}

/// Builds a plain [`CatalogItem`] from its definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemFactory;

impl MemberFactory for ItemFactory {
    fn create(&self, init: MemberInit) -> BoxFuture<'_, Result<CatalogMember, CatalogError>> {
        Box::pin(async move {
            CatalogItem::from_definition(&init.type_tag, &init.definition).map(CatalogMember::Item)
        })
    }
}

/// Adapts a closure into a [`MemberFactory`].
pub struct FnFactory<F>(pub F);

impl<F> MemberFactory for FnFactory<F>
where
    F: Fn(MemberInit) -> BoxFuture<'static, Result<CatalogMember, CatalogError>> + Send + Sync,
{
    fn create(&self, init: MemberInit) -> BoxFuture<'_, Result<CatalogMember, CatalogError>> {
        (self.0)(init)
    }
}

struct UrlMatcher {
    predicate: UrlPredicate,
    type_tag: String,
    factory: Arc<dyn MemberFactory>,
}

#[derive(Default, Clone)]
pub struct TypeRegistry {
    factories: HashMap<String, Arc<dyn MemberFactory>>,
    url_matchers: Vec<Arc<UrlMatcher>>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("TypeRegistry")
            .field("tags", &tags)
            .field("url_matchers", &self.url_matchers.len())
            .finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with [`register_builtin_members`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtin_members(&mut registry);
        registry
    }

    /// Associates `tag` with `factory`. Re-registering a tag replaces the
    /// previous factory.
    pub fn register(&mut self, tag: impl Into<String>, factory: impl MemberFactory + 'static) {
        self.register_shared(tag, Arc::new(factory));
    }

    pub fn register_shared(&mut self, tag: impl Into<String>, factory: Arc<dyn MemberFactory>) {
        let tag = tag.into();
        if self.factories.insert(tag.clone(), factory).is_some() {
            tracing::debug!(tag = %tag, "overriding registered catalog member type");
        }
    }

    /// Appends a URL matcher. Members it creates carry `type_tag`.
    pub fn register_url_matcher(
        &mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
        type_tag: impl Into<String>,
        factory: impl MemberFactory + 'static,
    ) {
        self.url_matchers.push(Arc::new(UrlMatcher {
            predicate: Arc::new(predicate),
            type_tag: type_tag.into(),
            factory: Arc::new(factory),
        }));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Type tag the first accepting URL matcher would assign, if any.
    pub fn type_for_url(&self, url: &str) -> Option<&str> {
        self.matcher_for(url).map(|m| m.type_tag.as_str())
    }

    fn matcher_for(&self, url: &str) -> Option<&Arc<UrlMatcher>> {
        self.url_matchers.iter().find(|m| (m.predicate)(url))
    }

    pub async fn create(
        &self,
        tag: &str,
        definition: Properties,
    ) -> Result<CatalogMember, CatalogError> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| CatalogError::UnknownType {
                tag: tag.to_string(),
            })?;
        factory
            .create(MemberInit {
                type_tag: tag.to_string(),
                definition,
            })
            .await
    }

    /// Creates a member for `url` via the first matcher that accepts it.
    ///
    /// The url is recorded under `url`, and doubles as the name when the
    /// definition has none.
    pub async fn create_from_url(
        &self,
        url: &str,
        mut definition: Properties,
    ) -> Result<CatalogMember, CatalogError> {
        let matcher = self.matcher_for(url).ok_or_else(|| CatalogError::NoMatch {
            url: url.to_string(),
        })?;
        definition
            .entry(URL_KEY)
            .or_insert_with(|| Value::String(url.to_string()));
        definition
            .entry(NAME_KEY)
            .or_insert_with(|| Value::String(url.to_string()));
        matcher
            .factory
            .create(MemberInit {
                type_tag: matcher.type_tag.clone(),
                definition,
            })
            .await
    }

    /// Dispatches on the definition's `type`, falling back to its `url`.
    pub async fn create_from_definition(
        &self,
        definition: Properties,
    ) -> Result<CatalogMember, CatalogError> {
        match definition.get(TYPE_KEY) {
            Some(Value::String(tag)) => {
                let tag = tag.clone();
                self.create(&tag, definition).await
            }
            Some(other) => Err(CatalogError::InvalidDefinition(format!(
                "`type` must be a string, got {other}"
            ))),
            None => match definition.get(URL_KEY).and_then(Value::as_str) {
                Some(url) => {
                    let url = url.to_string();
                    self.create_from_url(&url, definition).await
                }
                None => Err(CatalogError::InvalidDefinition(
                    "member has neither `type` nor `url`".to_string(),
                )),
            },
        }
    }
}

const GROUP_TAGS: &[&str] = &[
    "abs-itt-dataset-list",
    "ckan",
    "csw",
    "esri-group",
    "esri-mapServer-group",
    "group",
    "socrata",
    "wfs-features-group",
    "wfs-getCapabilities",
    "wms-getCapabilities",
    "wmts-getCapabilities",
];

const ITEM_TAGS: &[&str] = &[
    "abs-itt",
    "ckan-resource",
    "composite",
    "csv",
    "czml",
    "esri-mapServer",
    "geojson",
    "gpx",
    "kml",
    "kmz",
    "ogr",
    "open-street-map",
    "url-template",
    "wfs",
    "wms",
    "wmts",
];

// (extension, type tag), in evaluation order.
const URL_EXTENSIONS: &[(&str, &str)] = &[
    ("csv", "csv"),
    ("czm", "czml"),
    ("czml", "czml"),
    ("geojson", "geojson"),
    ("gpx", "gpx"),
    ("json", "geojson"),
    ("kml", "kml"),
    ("kmz", "kml"),
    ("topojson", "geojson"),
];

/// Registers the stock group and item types plus the file-extension URL
/// matchers, ending with a catch-all that hands unknown URLs to `ogr`.
pub fn register_builtin_members(registry: &mut TypeRegistry) {
    for tag in GROUP_TAGS {
        registry.register(*tag, GroupFactory);
    }
    for tag in ITEM_TAGS {
        registry.register(*tag, ItemFactory);
    }
    for (ext, tag) in URL_EXTENSIONS {
        registry.register_url_matcher(matches_extension(ext), *tag, ItemFactory);
    }
    registry.register_url_matcher(match_all(), "ogr", ItemFactory);
}

/// Case-insensitive `.ext` suffix match on the whole url.
pub fn matches_extension(extension: &str) -> impl Fn(&str) -> bool + Send + Sync + 'static {
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    move |url: &str| url.to_ascii_lowercase().ends_with(&suffix)
}

pub fn match_all() -> impl Fn(&str) -> bool + Send + Sync + 'static {
    |_: &str| true
}
