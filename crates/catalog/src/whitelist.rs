//! Which properties may cross the share-link boundary.
//!
//! Member properties fall into three groups: identity (`id`, `name`, which
//! only ever form the share address), shareable (listed here) and internal
//! (everything else, never serialized).

use std::collections::{BTreeMap, BTreeSet};

use crate::member::{CatalogMember, ID_KEY, NAME_KEY, Properties};

/// Flat user-level state (active tab and the like).
pub type UserProperties = BTreeMap<String, String>;

pub const DEFAULT_GROUP_PROPERTIES: &[&str] = &["type", "isOpen", "url"];

pub const DEFAULT_ITEM_PROPERTIES: &[&str] = &[
    "type",
    "isEnabled",
    "isShown",
    "isLegendVisible",
    "opacity",
    "url",
    "layers",
    "style",
    "parameters",
    "keepOnTop",
    "clipToRectangle",
    "rectangle",
    "tableStyle",
    "useOwnClock",
    "currentTime",
    "dataUrl",
    "dataUrlType",
];

pub const DEFAULT_USER_PROPERTIES: &[&str] = &["hideExplorerPanel", "activeTabId"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyWhitelist {
    group: BTreeSet<String>,
    item: BTreeSet<String>,
    by_type: BTreeMap<String, BTreeSet<String>>,
}

impl Default for PropertyWhitelist {
    fn default() -> Self {
        Self {
            group: to_set(DEFAULT_GROUP_PROPERTIES),
            item: to_set(DEFAULT_ITEM_PROPERTIES),
            by_type: BTreeMap::new(),
        }
    }
}

impl PropertyWhitelist {
    /// A whitelist that lets nothing but the given keys through.
    pub fn empty() -> Self {
        Self {
            group: BTreeSet::new(),
            item: BTreeSet::new(),
            by_type: BTreeMap::new(),
        }
    }

    pub fn allow_for_items(&mut self, key: impl Into<String>) -> &mut Self {
        self.item.insert(key.into());
        self
    }

    /// Extra shareable key for members of one type tag.
    pub fn allow_for_type(&mut self, type_tag: impl Into<String>, key: impl Into<String>) -> &mut Self {
        self.by_type
            .entry(type_tag.into())
            .or_default()
            .insert(key.into());
        self
    }

    pub fn is_shareable(&self, member: &CatalogMember, key: &str) -> bool {
        if key == ID_KEY || key == NAME_KEY {
            return false;
        }
        let base = if member.is_group() { &self.group } else { &self.item };
        base.contains(key)
            || self
                .by_type
                .get(member.type_tag())
                .is_some_and(|extra| extra.contains(key))
    }

    /// The member's shareable state, identity fields excluded.
    pub fn filter(&self, member: &CatalogMember) -> Properties {
        member
            .to_json()
            .into_iter()
            .filter(|(k, _)| {
                let keep = self.is_shareable(member, k);
                if !keep && k != ID_KEY && k != NAME_KEY {
                    tracing::trace!(member = member.name(), property = %k, "not shareable");
                }
                keep
            })
            .collect()
    }
}

/// Allowed keys for [`UserProperties`]. Matching is exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientWhitelist {
    keys: BTreeSet<String>,
}

impl Default for AmbientWhitelist {
    fn default() -> Self {
        Self {
            keys: to_set(DEFAULT_USER_PROPERTIES),
        }
    }
}

impl AmbientWhitelist {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn extend<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn filter(&self, props: &UserProperties) -> UserProperties {
        props
            .iter()
            .filter(|(k, _)| {
                let keep = self.contains(k);
                if !keep {
                    tracing::debug!(key = %k, "dropping non-whitelisted user property");
                }
                keep
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn to_set(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}
