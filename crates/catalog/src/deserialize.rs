//! Share map -> catalog tree.
//!
//! Each address is resolved against the target tree (id first, then path)
//! and its diff merged into the member found there. What happens to an
//! address that does not resolve is the caller's choice, see
//! [`DanglingPolicy`]; it is never dropped silently.

use futures_util::future::join_all;
use serde_json::Value;

use crate::error::{CatalogError, ShareReport};
use crate::loader::failed_placeholder;
use crate::member::{CatalogMember, ID_KEY, NAME_KEY, Properties};
use crate::registry::TypeRegistry;
use crate::serialize::{ShareMap, ShareState};
use crate::tree::{CatalogTree, MemberId, PATH_SEPARATOR};
use crate::whitelist::{AmbientWhitelist, UserProperties};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DanglingPolicy {
    /// Skip the entry and record a `DanglingReference` in the report.
    #[default]
    Report,
    /// Fail the whole apply before touching the tree.
    Abort,
    /// Build the member through the registry from the diff's `type` (or
    /// `url`); a failed build leaves a broken placeholder in the tree. A
    /// path whose parent group cannot be found is reported as dangling.
    Create,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub on_dangling: DanglingPolicy,
}

impl ApplyOptions {
    pub fn with_policy(on_dangling: DanglingPolicy) -> Self {
        Self { on_dangling }
    }
}

/// Merges every entry of `shared` into `tree`.
///
/// Only `DanglingPolicy::Abort` turns a per-member problem into an `Err`.
pub async fn apply_share_map(
    tree: &mut CatalogTree,
    shared: &ShareMap,
    registry: &TypeRegistry,
    options: ApplyOptions,
) -> Result<ShareReport, CatalogError> {
    let mut report = ShareReport::default();

    let mut resolved: Vec<(&String, &Properties, MemberId)> = Vec::new();
    let mut missing: Vec<(&String, &Properties)> = Vec::new();
    for (address, diff) in shared {
        match tree.find(address) {
            Some(id) => resolved.push((address, diff, id)),
            None => missing.push((address, diff)),
        }
    }

    if options.on_dangling == DanglingPolicy::Abort
        && let Some((address, _)) = missing.first()
    {
        return Err(CatalogError::DanglingReference {
            address: (*address).clone(),
        });
    }

    for (address, diff, id) in resolved {
        merge_into(tree, id, address, diff, &mut report);
    }

    match options.on_dangling {
        DanglingPolicy::Report | DanglingPolicy::Abort => {
            for (address, _) in missing {
                tracing::warn!(address = %address, "shared catalog member not found");
                report.skipped.push(address.clone());
                report.push_error(
                    address.clone(),
                    CatalogError::DanglingReference {
                        address: address.clone(),
                    },
                );
            }
        }
        DanglingPolicy::Create => {
            create_missing(tree, missing, registry, &mut report).await;
        }
    }

    Ok(report)
}

/// Applies a decoded share: catalog members, then user properties.
pub async fn apply_share_state(
    tree: &mut CatalogTree,
    state: &ShareState,
    registry: &TypeRegistry,
    user_store: &mut UserProperties,
    ambient: &AmbientWhitelist,
    options: ApplyOptions,
) -> Result<ShareReport, CatalogError> {
    let report = apply_share_map(tree, &state.shared, registry, options).await?;
    apply_user_properties(user_store, &state.user_properties, ambient);
    Ok(report)
}

/// Overwrite-merges the whitelisted subset of `incoming` into `store`.
pub fn apply_user_properties(
    store: &mut UserProperties,
    incoming: &UserProperties,
    ambient: &AmbientWhitelist,
) {
    store.extend(ambient.filter(incoming));
}

fn merge_into(
    tree: &mut CatalogTree,
    id: MemberId,
    address: &str,
    diff: &Properties,
    report: &mut ShareReport,
) {
    let Some(member) = tree.get_mut(id) else {
        return;
    };
    if let Err(e) = member.update_from_json(diff) {
        report.push_error(address, e);
    }
    report.applied.push(address.to_string());
}

/// Where a not-yet-existing address should live.
struct Placement {
    parent_path: Option<String>,
    definition: Properties,
    depth: usize,
}

fn placement(root_name: &str, address: &str, diff: &Properties) -> Placement {
    let mut definition = diff.clone();
    let prefix = format!("{root_name}{PATH_SEPARATOR}");
    match address.strip_prefix(&prefix) {
        Some(rest) => {
            let (parent_path, name) = match rest.rsplit_once(PATH_SEPARATOR) {
                Some((parent, name)) => (format!("{prefix}{parent}"), name.to_string()),
                None => (root_name.to_string(), rest.to_string()),
            };
            definition.insert(NAME_KEY.to_string(), Value::String(name));
            Placement {
                parent_path: Some(parent_path),
                definition,
                depth: address.matches(PATH_SEPARATOR).count(),
            }
        }
        None => {
            definition.insert(ID_KEY.to_string(), Value::String(address.to_string()));
            definition.insert(NAME_KEY.to_string(), Value::String(address.to_string()));
            Placement {
                parent_path: None,
                definition,
                depth: 1,
            }
        }
    }
}

/// Builds members for unresolved addresses, shallowest first so that a
/// shared group exists before the items addressed beneath it. Within one
/// depth the builds run concurrently and attach in address order.
async fn create_missing(
    tree: &mut CatalogTree,
    missing: Vec<(&String, &Properties)>,
    registry: &TypeRegistry,
    report: &mut ShareReport,
) {
    let root_name = tree
        .get(tree.root())
        .map(|r| r.name().to_string())
        .unwrap_or_default();

    let mut planned: Vec<(&String, Placement)> = missing
        .into_iter()
        .map(|(address, diff)| (address, placement(&root_name, address, diff)))
        .collect();
    // Stable sort keeps ascending address order within a depth.
    planned.sort_by_key(|(_, p)| p.depth);

    let mut start = 0;
    while start < planned.len() {
        let depth = planned[start].1.depth;
        let end = planned[start..]
            .iter()
            .position(|(_, p)| p.depth != depth)
            .map_or(planned.len(), |n| start + n);
        let batch = &planned[start..end];
        start = end;

        let results = join_all(
            batch
                .iter()
                .map(|(_, p)| registry.create_from_definition(p.definition.clone())),
        )
        .await;

        for ((address, placement), result) in batch.iter().zip(results) {
            // A member built earlier in this apply may already answer here.
            if let Some(existing) = tree.find(address) {
                merge_into(tree, existing, address, &placement.definition, report);
                continue;
            }

            let Some(parent) = resolve_parent(tree, placement.parent_path.as_deref()) else {
                tracing::warn!(address = %address, "parent group of shared catalog member not found");
                report.skipped.push((*address).clone());
                report.push_error(
                    address.as_str(),
                    CatalogError::DanglingReference {
                        address: (*address).clone(),
                    },
                );
                continue;
            };

            let member = match result {
                Ok(member) => member,
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "could not build shared catalog member");
                    let placeholder = failed_placeholder(&placement.definition, &e);
                    report.push_error(address.as_str(), e);
                    placeholder
                }
            };

            match tree.add_child(parent, member) {
                Ok(id) => report.created.push(tree.address_of(id)),
                Err(e) => report.push_error(address.as_str(), e),
            }
        }
    }
}

/// The group a new member attaches to. Id-form addresses go under the root;
/// a path whose parent is missing, or is not a group, has no home.
fn resolve_parent(tree: &CatalogTree, parent_path: Option<&str>) -> Option<MemberId> {
    let Some(path) = parent_path else {
        return Some(tree.root());
    };
    tree.find(path)
        .filter(|id| tree.get(*id).is_some_and(CatalogMember::is_group))
}
