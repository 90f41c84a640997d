//! Catalog-definition loading.
//!
//! A definition is a JSON array of member objects (`name`, `type`, optional
//! `id`, flags, provider properties, and `items` for groups). Loading merges
//! it into an existing tree: members that already exist are updated in
//! place, new ones go through the [`TypeRegistry`].
//!
//! Sibling creations run concurrently; results are attached in definition
//! order once all of them have settled.

use futures_util::future::join_all;
use serde_json::Value;

use crate::error::{CatalogError, ShareReport};
use crate::member::{
    CatalogItem, CatalogMember, ID_KEY, ITEMS_KEY, MemberInfo, NAME_KEY, Properties, TYPE_KEY,
};
use crate::registry::{BoxFuture, TypeRegistry};
use crate::tree::{CatalogTree, MemberId};

pub const UNNAMED_MEMBER: &str = "Unnamed Item";

/// Builds a fresh tree from a top-level definition array.
pub async fn load_catalog(
    definitions: &Value,
    registry: &TypeRegistry,
) -> Result<(CatalogTree, ShareReport), CatalogError> {
    let mut tree = CatalogTree::new();
    let root = tree.root();
    let report = update_from_json(&mut tree, root, definitions, registry).await?;
    Ok((tree, report))
}

/// Merges `definitions` into the children of `parent`.
///
/// Fails only when `definitions` is not an array or `parent` is not a group;
/// per-member problems are collected in the returned report.
pub async fn update_from_json(
    tree: &mut CatalogTree,
    parent: MemberId,
    definitions: &Value,
    registry: &TypeRegistry,
) -> Result<ShareReport, CatalogError> {
    let Value::Array(definitions) = definitions else {
        return Err(CatalogError::InvalidDefinition(
            "catalog definition must be an array of members".to_string(),
        ));
    };
    if !tree.get(parent).is_some_and(CatalogMember::is_group) {
        return Err(CatalogError::InvalidDefinition(format!(
            "{} is not a group",
            tree.path_of(parent)
        )));
    }

    let mut report = ShareReport::default();
    update_level(tree, parent, definitions, registry, &mut report).await;
    Ok(report)
}

enum Slot {
    Existing(MemberId),
    Pending(usize),
    Invalid,
}

fn update_level<'a>(
    tree: &'a mut CatalogTree,
    parent: MemberId,
    definitions: &'a [Value],
    registry: &'a TypeRegistry,
    report: &'a mut ShareReport,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let parent_path = tree.path_of(parent);
        let mut slots: Vec<Slot> = Vec::with_capacity(definitions.len());
        let mut pending: Vec<Properties> = Vec::new();

        for definition in definitions {
            let Value::Object(definition) = definition else {
                report.push_error(
                    parent_path.clone(),
                    CatalogError::InvalidDefinition(format!(
                        "catalog member must be an object, got {definition}"
                    )),
                );
                slots.push(Slot::Invalid);
                continue;
            };

            let member_id = definition.get(ID_KEY).and_then(Value::as_str);
            let name = definition
                .get(NAME_KEY)
                .and_then(Value::as_str)
                .unwrap_or(UNNAMED_MEMBER);
            let diff = without_items(definition);

            match tree.child_matching(parent, member_id, name) {
                Some(existing) => {
                    let address = tree.address_of(existing);
                    if let Some(member) = tree.get_mut(existing)
                        && let Err(e) = member.update_from_json(&diff)
                    {
                        report.push_error(address.clone(), e);
                    }
                    report.applied.push(address);
                    slots.push(Slot::Existing(existing));
                }
                None => {
                    slots.push(Slot::Pending(pending.len()));
                    pending.push(diff);
                }
            }
        }

        let created = join_all(
            pending
                .iter()
                .cloned()
                .map(|definition| registry.create_from_definition(definition)),
        )
        .await;

        let mut resolved: Vec<Option<MemberId>> = Vec::with_capacity(slots.len());
        let mut created = created.into_iter();
        for (slot, definition) in slots.iter().zip(definitions) {
            let id = match slot {
                Slot::Existing(id) => Some(*id),
                Slot::Invalid => None,
                Slot::Pending(idx) => {
                    let Some(result) = created.next() else {
                        break;
                    };
                    let member = match result {
                        Ok(member) => member,
                        Err(e) => {
                            let placeholder = failed_placeholder(&pending[*idx], &e);
                            let address = format!("{parent_path}/{}", placeholder.name());
                            tracing::warn!(address = %address, error = %e, "catalog member failed to load");
                            report.push_error(address, e);
                            placeholder
                        }
                    };
                    match tree.add_child(parent, member) {
                        Ok(id) => {
                            report.created.push(tree.address_of(id));
                            Some(id)
                        }
                        Err(e) => {
                            report.push_error(parent_path.clone(), e);
                            None
                        }
                    }
                }
            };
            resolved.push(id.filter(|_| definition.get(ITEMS_KEY).is_some()));
        }

        for (id, definition) in resolved.into_iter().zip(definitions) {
            let Some(id) = id else {
                continue;
            };
            let Some(items) = definition.get(ITEMS_KEY) else {
                continue;
            };
            let address = tree.address_of(id);
            if !tree.get(id).is_some_and(CatalogMember::is_group) {
                report.push_error(
                    address,
                    CatalogError::InvalidDefinition("only groups can have items".to_string()),
                );
                continue;
            }
            match items {
                Value::Array(items) => {
                    update_level(tree, id, items, registry, report).await;
                }
                other => report.push_error(
                    address,
                    CatalogError::InvalidDefinition(format!("`items` must be an array, got {other}")),
                ),
            }
        }
    })
}

fn without_items(definition: &Properties) -> Properties {
    definition
        .iter()
        .filter(|(k, _)| k.as_str() != ITEMS_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Broken stand-in that keeps the failed member visible in the tree.
pub(crate) fn failed_placeholder(definition: &Properties, error: &CatalogError) -> CatalogMember {
    let name = definition
        .get(NAME_KEY)
        .and_then(Value::as_str)
        .unwrap_or(UNNAMED_MEMBER);
    let type_tag = definition
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let mut info = MemberInfo::new(type_tag, name);
    info.id = definition
        .get(ID_KEY)
        .and_then(Value::as_str)
        .map(str::to_string);
    CatalogMember::Item(CatalogItem::failed(info, error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::LoadStatus;
    use crate::registry::{FnFactory, GroupFactory, ItemFactory, MemberInit};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register("group", GroupFactory);
        registry.register("item", ItemFactory);
        registry
    }

    fn names(tree: &CatalogTree, id: MemberId) -> Vec<String> {
        tree.children(id)
            .iter()
            .map(|c| tree.get(*c).unwrap().name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn loads_nested_groups() {
        let (tree, report) = load_catalog(
            &json!([
                {"name": "Group", "type": "group", "isOpen": true, "items": [
                    {"name": "Item", "type": "item", "isEnabled": true}
                ]}
            ]),
            &registry(),
        )
        .await
        .unwrap();

        assert!(report.errors.is_empty());
        let item = tree.find("Root Group/Group/Item").unwrap();
        assert!(tree.get(item).unwrap().is_enabled());
        assert!(tree.get(tree.find("Root Group/Group").unwrap()).unwrap().is_open());
        assert_eq!(
            report.created,
            vec!["Root Group/Group".to_string(), "Root Group/Group/Item".to_string()]
        );
    }

    #[tokio::test]
    async fn concurrent_creations_keep_definition_order() {
        let mut registry = registry();
        registry.register(
            "slow",
            FnFactory(
                |init: MemberInit| -> BoxFuture<'static, Result<CatalogMember, CatalogError>> {
                    Box::pin(async move {
                        let delay = init
                            .definition
                            .get("delayMs")
                            .and_then(Value::as_u64)
                            .unwrap_or(0);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        CatalogItem::from_definition(&init.type_tag, &init.definition)
                            .map(CatalogMember::Item)
                    })
                },
            ),
        );

        let (tree, _) = load_catalog(
            &json!([
                {"name": "a", "type": "slow", "delayMs": 40},
                {"name": "b", "type": "slow", "delayMs": 0},
                {"name": "c", "type": "slow", "delayMs": 20}
            ]),
            &registry,
        )
        .await
        .unwrap();

        assert_eq!(names(&tree, tree.root()), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failed_members_become_placeholders_in_place() {
        let (tree, report) = load_catalog(
            &json!([
                {"name": "a", "type": "item"},
                {"name": "b", "type": "nope"},
                {"name": "c", "type": "item"}
            ]),
            &registry(),
        )
        .await
        .unwrap();

        assert_eq!(names(&tree, tree.root()), vec!["a", "b", "c"]);
        let b = tree.find("Root Group/b").unwrap();
        assert!(matches!(
            tree.get(b).unwrap().status(),
            LoadStatus::Failed(_)
        ));
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0].error,
            CatalogError::UnknownType { .. }
        ));
    }

    #[tokio::test]
    async fn reloading_merges_instead_of_duplicating() {
        let registry = registry();
        let (mut tree, _) = load_catalog(
            &json!([
                {"name": "Group", "type": "group", "items": [
                    {"name": "Item", "type": "item"},
                    {"id": "x", "name": "Other", "type": "item"}
                ]}
            ]),
            &registry,
        )
        .await
        .unwrap();

        let root = tree.root();
        let report = update_from_json(
            &mut tree,
            root,
            &json!([
                {"name": "Group", "type": "group", "isOpen": true, "items": [
                    {"name": "Item", "isEnabled": true, "opacity": 0.5},
                    {"id": "x", "name": "Renamed", "isEnabled": true}
                ]}
            ]),
            &registry,
        )
        .await
        .unwrap();

        assert!(report.created.is_empty());
        assert_eq!(tree.len(), 4);
        let item = tree.get(tree.find("Root Group/Group/Item").unwrap()).unwrap();
        assert!(item.is_enabled());
        assert_eq!(item.properties().get("opacity"), Some(&json!(0.5)));
        let other = tree.get(tree.find("x").unwrap()).unwrap();
        assert!(other.is_enabled());
        assert_eq!(other.name(), "Other");
    }

    #[tokio::test]
    async fn items_on_an_item_are_reported() {
        let (tree, report) = load_catalog(
            &json!([{"name": "Leaf", "type": "item", "items": [{"name": "x", "type": "item"}]}]),
            &registry(),
        )
        .await
        .unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].address, "Root Group/Leaf");
    }

    #[tokio::test]
    async fn non_array_definition_is_rejected() {
        let err = load_catalog(&json!({"name": "x"}), &registry())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDefinition(_)));
    }
}
