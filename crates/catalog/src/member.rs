//! Catalog members: the nodes of a catalog tree.
//!
//! A member is either a group (container, `isOpen`) or an item (leaf data
//! source, `isEnabled`). Both share a [`MemberInfo`] carrying identity, the
//! registry type tag and an open-ended bag of provider properties.

use serde_json::{Map, Value};

use crate::error::CatalogError;

pub type Properties = Map<String, Value>;

pub const ID_KEY: &str = "id";
pub const NAME_KEY: &str = "name";
pub const TYPE_KEY: &str = "type";
pub const ITEMS_KEY: &str = "items";
pub const ENABLED_KEY: &str = "isEnabled";
pub const OPEN_KEY: &str = "isOpen";
pub const DATA_KEY: &str = "data";
pub const URL_KEY: &str = "url";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Ready,
    /// A loader is still fetching or parsing remote content.
    Loading,
    /// Construction failed; the member stays in the tree as a broken entry.
    Failed(String),
}

// Groups have no loader of their own.
static GROUP_STATUS: LoadStatus = LoadStatus::Ready;

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub id: Option<String>,
    pub name: String,
    type_tag: String,
    pub properties: Properties,
}

impl MemberInfo {
    pub fn new(type_tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            type_tag: type_tag.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The tag this member was constructed from. Fixed after creation.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Builds identity and provider properties from a definition object.
    ///
    /// Structural keys (`type`, `items`, `isOpen`, `isEnabled`) are left for
    /// the variant constructors and the loader.
    pub fn from_definition(type_tag: &str, definition: &Properties) -> Result<Self, CatalogError> {
        let name = match definition.get(NAME_KEY) {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(CatalogError::InvalidDefinition(format!(
                    "`name` must be a string, got {other}"
                )));
            }
            None => {
                return Err(CatalogError::InvalidDefinition(format!(
                    "member of type `{type_tag}` has no name"
                )));
            }
        };
        let id = match definition.get(ID_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(other) => {
                return Err(CatalogError::InvalidDefinition(format!(
                    "`id` of {name} must be a string, got {other}"
                )));
            }
        };

        let properties = definition
            .iter()
            .filter(|(k, _)| !is_structural_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            id,
            name,
            type_tag: type_tag.to_string(),
            properties,
        })
    }
}

fn is_structural_key(key: &str) -> bool {
    matches!(
        key,
        ID_KEY | NAME_KEY | TYPE_KEY | ITEMS_KEY | ENABLED_KEY | OPEN_KEY
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogGroup {
    pub info: MemberInfo,
    pub open: bool,
}

impl CatalogGroup {
    pub fn new(info: MemberInfo) -> Self {
        Self { info, open: false }
    }

    pub fn from_definition(type_tag: &str, definition: &Properties) -> Result<Self, CatalogError> {
        let info = MemberInfo::from_definition(type_tag, definition)?;
        let open = read_flag(&info.name, definition, OPEN_KEY)?.unwrap_or(false);
        Ok(Self { info, open })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub info: MemberInfo,
    pub enabled: bool,
    pub status: LoadStatus,
}

impl CatalogItem {
    pub fn new(info: MemberInfo) -> Self {
        Self {
            info,
            enabled: false,
            status: LoadStatus::Ready,
        }
    }

    pub fn from_definition(type_tag: &str, definition: &Properties) -> Result<Self, CatalogError> {
        let info = MemberInfo::from_definition(type_tag, definition)?;
        let enabled = read_flag(&info.name, definition, ENABLED_KEY)?.unwrap_or(false);
        Ok(Self {
            info,
            enabled,
            status: LoadStatus::Ready,
        })
    }

    /// Placeholder standing in for a member whose construction failed.
    pub fn failed(info: MemberInfo, reason: impl Into<String>) -> Self {
        Self {
            info,
            enabled: false,
            status: LoadStatus::Failed(reason.into()),
        }
    }

    /// Embedded data cannot travel inside a share link.
    pub fn has_local_data(&self) -> bool {
        self.info
            .properties
            .get(DATA_KEY)
            .is_some_and(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogMember {
    Group(CatalogGroup),
    Item(CatalogItem),
}

impl CatalogMember {
    pub fn info(&self) -> &MemberInfo {
        match self {
            CatalogMember::Group(g) => &g.info,
            CatalogMember::Item(i) => &i.info,
        }
    }

    pub fn info_mut(&mut self) -> &mut MemberInfo {
        match self {
            CatalogMember::Group(g) => &mut g.info,
            CatalogMember::Item(i) => &mut i.info,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.info().id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn type_tag(&self) -> &str {
        self.info().type_tag()
    }

    pub fn properties(&self) -> &Properties {
        &self.info().properties
    }

    pub fn is_group(&self) -> bool {
        matches!(self, CatalogMember::Group(_))
    }

    pub fn as_group(&self) -> Option<&CatalogGroup> {
        match self {
            CatalogMember::Group(g) => Some(g),
            CatalogMember::Item(_) => None,
        }
    }

    pub fn as_item(&self) -> Option<&CatalogItem> {
        match self {
            CatalogMember::Item(i) => Some(i),
            CatalogMember::Group(_) => None,
        }
    }

    /// `isOpen` for groups; always false for items.
    pub fn is_open(&self) -> bool {
        self.as_group().is_some_and(|g| g.open)
    }

    /// `isEnabled` for items; always false for groups.
    pub fn is_enabled(&self) -> bool {
        self.as_item().is_some_and(|i| i.enabled)
    }

    pub fn has_local_data(&self) -> bool {
        self.as_item().is_some_and(CatalogItem::has_local_data)
    }

    pub fn status(&self) -> &LoadStatus {
        match self {
            CatalogMember::Group(_) => &GROUP_STATUS,
            CatalogMember::Item(i) => &i.status,
        }
    }

    /// Applies a partial update.
    ///
    /// `isOpen`/`isEnabled` drive the variant flags (and are ignored on the
    /// other variant), `null` removes a property, identity fields and
    /// `items` are ignored. Keys that fail
    /// validation are skipped and the first failure is returned after the
    /// rest of the diff has been applied.
    pub fn update_from_json(&mut self, diff: &Properties) -> Result<(), CatalogError> {
        let mut first_err: Option<CatalogError> = None;

        for (key, value) in diff {
            let res = match (key.as_str(), &mut *self) {
                (ID_KEY | NAME_KEY | ITEMS_KEY, _) => Ok(()),
                (TYPE_KEY, member) => {
                    if value.as_str() != Some(member.type_tag()) {
                        tracing::debug!(
                            member = member.name(),
                            "ignoring type change to {value}; type tags are fixed"
                        );
                    }
                    Ok(())
                }
                (OPEN_KEY, CatalogMember::Group(g)) => {
                    bool_value(&g.info.name, key, value).map(|open| g.open = open)
                }
                (ENABLED_KEY, CatalogMember::Item(i)) => {
                    bool_value(&i.info.name, key, value).map(|enabled| i.enabled = enabled)
                }
                (OPEN_KEY | ENABLED_KEY, member) => {
                    tracing::debug!(member = member.name(), "ignoring `{key}`; it does not apply to this member");
                    Ok(())
                }
                (_, member) => {
                    let props = &mut member.info_mut().properties;
                    if value.is_null() {
                        props.remove(key);
                    } else {
                        props.insert(key.clone(), value.clone());
                    }
                    Ok(())
                }
            };

            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Full JSON view of the member: identity, type, flags and properties.
    pub fn to_json(&self) -> Properties {
        let info = self.info();
        let mut out = info.properties.clone();
        if let Some(id) = &info.id {
            out.insert(ID_KEY.to_string(), Value::String(id.clone()));
        }
        out.insert(NAME_KEY.to_string(), Value::String(info.name.clone()));
        out.insert(TYPE_KEY.to_string(), Value::String(info.type_tag.clone()));
        match self {
            CatalogMember::Group(g) => {
                out.insert(OPEN_KEY.to_string(), Value::Bool(g.open));
            }
            CatalogMember::Item(i) => {
                out.insert(ENABLED_KEY.to_string(), Value::Bool(i.enabled));
            }
        }
        out
    }
}

fn read_flag(name: &str, definition: &Properties, key: &str) -> Result<Option<bool>, CatalogError> {
    match definition.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => bool_value(name, key, v).map(Some),
    }
}

fn bool_value(name: &str, key: &str, value: &Value) -> Result<bool, CatalogError> {
    value.as_bool().ok_or_else(|| CatalogError::InvalidProperty {
        address: name.to_string(),
        property: key.to_string(),
        reason: format!("expected a boolean, got {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn props(v: Value) -> Properties {
        match v {
            Value::Object(m) => m,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn definition_splits_identity_from_properties() {
        let def = props(json!({
            "id": "abc",
            "name": "Rivers",
            "type": "wms",
            "isEnabled": true,
            "opacity": 0.5,
            "url": "http://example.com/wms"
        }));
        let item = CatalogItem::from_definition("wms", &def).unwrap();

        assert_eq!(item.info.id.as_deref(), Some("abc"));
        assert_eq!(item.info.name, "Rivers");
        assert_eq!(item.info.type_tag(), "wms");
        assert!(item.enabled);
        assert_eq!(
            item.info.properties,
            props(json!({"opacity": 0.5, "url": "http://example.com/wms"}))
        );
    }

    #[test]
    fn definition_without_name_is_rejected() {
        let err = CatalogGroup::from_definition("group", &props(json!({"isOpen": true})))
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDefinition(_)));
    }

    #[test]
    fn local_data_is_detected() {
        let def = props(json!({"name": "C", "data": {"blah": "otherBlah"}}));
        let item = CatalogItem::from_definition("csv", &def).unwrap();
        assert!(item.has_local_data());

        let def = props(json!({"name": "C", "data": null}));
        let item = CatalogItem::from_definition("csv", &def).unwrap();
        assert!(!item.has_local_data());
    }

    #[test]
    fn update_sets_flags_and_merges_properties() {
        let mut member = CatalogMember::Item(CatalogItem::new(MemberInfo::new("csv", "C")));
        member.info_mut().properties.insert("legend".into(), json!("a.png"));

        member
            .update_from_json(&props(json!({
                "isEnabled": true,
                "opacity": 0.8,
                "legend": null,
                "name": "Renamed",
                "type": "wms"
            })))
            .unwrap();

        assert!(member.is_enabled());
        assert_eq!(member.name(), "C");
        assert_eq!(member.type_tag(), "csv");
        assert_eq!(member.properties(), &props(json!({"opacity": 0.8})));
    }

    #[test]
    fn update_reports_bad_flag_but_applies_the_rest() {
        let mut member = CatalogMember::Group(CatalogGroup::new(MemberInfo::new("group", "G")));
        let err = member
            .update_from_json(&props(json!({"isOpen": "yes", "description": "d"})))
            .unwrap_err();

        assert!(matches!(err, CatalogError::InvalidProperty { ref property, .. } if property == "isOpen"));
        assert!(!member.is_open());
        assert_eq!(member.properties().get("description"), Some(&json!("d")));
    }

    #[test]
    fn flags_of_the_other_variant_are_ignored() {
        let mut group = CatalogMember::Group(CatalogGroup::new(MemberInfo::new("group", "G")));
        group
            .update_from_json(&props(json!({"isEnabled": true, "isOpen": true})))
            .unwrap();
        assert!(group.is_open());
        assert!(group.properties().is_empty());
        assert_eq!(
            Value::Object(group.to_json()),
            json!({"name": "G", "type": "group", "isOpen": true})
        );

        let mut item = CatalogMember::Item(CatalogItem::new(MemberInfo::new("csv", "C")));
        item.update_from_json(&props(json!({"isOpen": true}))).unwrap();
        assert!(!item.is_enabled());
        assert!(!item.properties().contains_key("isOpen"));
    }

    #[test]
    fn to_json_includes_identity_and_flags() {
        let mut group = CatalogGroup::new(MemberInfo::new("group", "G").with_id("g1"));
        group.open = true;
        let json = CatalogMember::Group(group).to_json();
        assert_eq!(
            Value::Object(json),
            json!({"id": "g1", "name": "G", "type": "group", "isOpen": true})
        );
    }
}
