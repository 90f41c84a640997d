//! Catalog tree -> share map.
//!
//! Walk rules (depth-first pre-order from the root; the root is never
//! emitted):
//! - an open group is emitted unless some ancestor is closed;
//! - an enabled, ready item without local data is emitted unless some
//!   ancestor is closed;
//! - a closed group hides its whole subtree, whatever the descendants' own
//!   flags say.
//!
//! Members are keyed by id, or by path when they have none. Two members
//! with the same address collapse into one entry; the later one in walk
//! order wins.

use std::collections::BTreeMap;

use crate::member::{CatalogMember, LoadStatus, Properties};
use crate::tree::{CatalogTree, MemberId};
use crate::whitelist::{AmbientWhitelist, PropertyWhitelist, UserProperties};

/// Address -> shareable property diff.
pub type ShareMap = BTreeMap<String, Properties>;

/// Everything a share link carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShareState {
    pub shared: ShareMap,
    pub user_properties: UserProperties,
}

pub fn serialize_share_map(tree: &CatalogTree, whitelist: &PropertyWhitelist) -> ShareMap {
    let mut out = ShareMap::new();
    walk(tree, tree.root(), false, whitelist, &mut out);
    out
}

/// Share map plus the whitelisted subset of `user_properties`.
pub fn serialize_share_state(
    tree: &CatalogTree,
    whitelist: &PropertyWhitelist,
    ambient: &AmbientWhitelist,
    user_properties: &UserProperties,
) -> ShareState {
    ShareState {
        shared: serialize_share_map(tree, whitelist),
        user_properties: ambient.filter(user_properties),
    }
}

fn walk(
    tree: &CatalogTree,
    group: MemberId,
    ancestor_closed: bool,
    whitelist: &PropertyWhitelist,
    out: &mut ShareMap,
) {
    for &child in tree.children(group) {
        let Some(member) = tree.get(child) else {
            continue;
        };
        match member {
            CatalogMember::Group(g) => {
                if g.open && !ancestor_closed {
                    emit(tree, child, member, whitelist, out);
                }
                walk(tree, child, ancestor_closed || !g.open, whitelist, out);
            }
            CatalogMember::Item(item) => {
                if !item.enabled || ancestor_closed {
                    continue;
                }
                if item.has_local_data() {
                    tracing::debug!(item = %item.info.name, "skipping item with local data");
                    continue;
                }
                if item.status != LoadStatus::Ready {
                    tracing::debug!(item = %item.info.name, status = ?item.status, "skipping unsettled item");
                    continue;
                }
                emit(tree, child, member, whitelist, out);
            }
        }
    }
}

fn emit(
    tree: &CatalogTree,
    id: MemberId,
    member: &CatalogMember,
    whitelist: &PropertyWhitelist,
    out: &mut ShareMap,
) {
    let address = tree.address_of(id);
    let diff = whitelist.filter(member);
    if out.insert(address.clone(), diff).is_some() {
        tracing::warn!(address = %address, "share address collision; keeping the later member");
    }
}
