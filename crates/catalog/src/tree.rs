//! In-memory catalog tree.
//!
//! Members live in a slot vector and are addressed by [`MemberId`]; each
//! node keeps its parent link and ordered children. Removed members leave an
//! empty slot behind, so ids are never reused within one tree.
//!
//! Ordering contract:
//! - `children` preserves insertion order.
//! - Traversals are depth-first pre-order.

use serde_json::Value;

use crate::error::CatalogError;
use crate::member::{CatalogGroup, CatalogMember, ITEMS_KEY, MemberInfo};

pub const ROOT_GROUP_NAME: &str = "Root Group";
pub const PATH_SEPARATOR: char = '/';

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberId(u32);

#[derive(Debug, Clone)]
struct Node {
    member: CatalogMember,
    parent: Option<MemberId>,
    children: Vec<MemberId>,
}

#[derive(Debug, Clone)]
pub struct CatalogTree {
    nodes: Vec<Option<Node>>,
    root: MemberId,
}

impl Default for CatalogTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogTree {
    /// An empty tree whose root is an open group named `Root Group`.
    pub fn new() -> Self {
        let mut root = CatalogGroup::new(MemberInfo::new("group", ROOT_GROUP_NAME));
        root.open = true;
        Self::with_root(root)
    }

    pub fn with_root(root: CatalogGroup) -> Self {
        Self {
            nodes: vec![Some(Node {
                member: CatalogMember::Group(root),
                parent: None,
                children: Vec::new(),
            })],
            root: MemberId(0),
        }
    }

    pub fn root(&self) -> MemberId {
        self.root
    }

    /// Number of live members, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    fn node(&self, id: MemberId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: MemberId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn get(&self, id: MemberId) -> Option<&CatalogMember> {
        self.node(id).map(|n| &n.member)
    }

    pub fn get_mut(&mut self, id: MemberId) -> Option<&mut CatalogMember> {
        self.node_mut(id).map(|n| &mut n.member)
    }

    pub fn parent(&self, id: MemberId) -> Option<MemberId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: MemberId) -> &[MemberId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Appends `member` as the last child of `parent`.
    pub fn add_child(
        &mut self,
        parent: MemberId,
        member: CatalogMember,
    ) -> Result<MemberId, CatalogError> {
        let index = self.children(parent).len();
        self.insert_child(parent, index, member)
    }

    /// Inserts `member` at `index` among `parent`'s children (clamped to the
    /// end).
    pub fn insert_child(
        &mut self,
        parent: MemberId,
        index: usize,
        member: CatalogMember,
    ) -> Result<MemberId, CatalogError> {
        match self.get(parent) {
            Some(CatalogMember::Group(_)) => {}
            Some(other) => {
                return Err(CatalogError::InvalidDefinition(format!(
                    "cannot add children to item {}",
                    other.name()
                )));
            }
            None => {
                return Err(CatalogError::InvalidDefinition(format!(
                    "parent {parent:?} is not in the tree"
                )));
            }
        }

        let id = MemberId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            member,
            parent: Some(parent),
            children: Vec::new(),
        }));
        if let Some(p) = self.node_mut(parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, id);
        }
        Ok(id)
    }

    /// Detaches `id` and drops its whole subtree. The root cannot be removed.
    pub fn remove(&mut self, id: MemberId) -> Option<CatalogMember> {
        let parent = self.parent(id)?;
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }

        let mut stack = self.children(id).to_vec();
        while let Some(child) = stack.pop() {
            stack.extend_from_slice(self.children(child));
            self.nodes[child.0 as usize] = None;
        }
        self.nodes[id.0 as usize].take().map(|n| n.member)
    }

    /// Returns `false` when `id` is not an item.
    pub fn set_enabled(&mut self, id: MemberId, enabled: bool) -> bool {
        match self.get_mut(id) {
            Some(CatalogMember::Item(item)) => {
                item.enabled = enabled;
                true
            }
            _ => false,
        }
    }

    /// Returns `false` when `id` is not a group.
    pub fn set_open(&mut self, id: MemberId, open: bool) -> bool {
        match self.get_mut(id) {
            Some(CatalogMember::Group(group)) => {
                group.open = open;
                true
            }
            _ => false,
        }
    }

    /// `/`-joined names from the root down to `id`, root included.
    pub fn path_of(&self, id: MemberId) -> String {
        let mut names: Vec<&str> = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.node(current) else {
                break;
            };
            names.push(node.member.name());
            cursor = node.parent;
        }
        names.reverse();
        names.join(&PATH_SEPARATOR.to_string())
    }

    /// The share address of a member: its id when it has one, else its path.
    pub fn address_of(&self, id: MemberId) -> String {
        match self.get(id).and_then(CatalogMember::id) {
            Some(member_id) => member_id.to_string(),
            None => self.path_of(id),
        }
    }

    /// Resolves an address: member id anywhere in the tree first, then an
    /// exact path. With same-named siblings the first in pre-order wins.
    pub fn find(&self, address: &str) -> Option<MemberId> {
        self.find_by_id(address).or_else(|| self.find_by_path(address))
    }

    pub fn find_by_id(&self, member_id: &str) -> Option<MemberId> {
        self.descendants(self.root)
            .into_iter()
            .chain(std::iter::once(self.root))
            .find(|id| self.get(*id).and_then(CatalogMember::id) == Some(member_id))
    }

    pub fn find_by_path(&self, path: &str) -> Option<MemberId> {
        let root_name = self.get(self.root)?.name();
        let mut stack: Vec<(MemberId, String)> = vec![(self.root, root_name.to_string())];
        while let Some((id, current)) = stack.pop() {
            if current == path {
                return Some(id);
            }
            for child in self.children(id).iter().rev() {
                let Some(member) = self.get(*child) else {
                    continue;
                };
                let child_path = format!("{current}{PATH_SEPARATOR}{}", member.name());
                // Only descend branches that can still spell out `path`.
                if path.starts_with(&child_path) {
                    stack.push((*child, child_path));
                }
            }
        }
        None
    }

    /// Pre-order descendants of `id`, `id` itself excluded.
    pub fn descendants(&self, id: MemberId) -> Vec<MemberId> {
        let mut out = Vec::new();
        let mut stack: Vec<MemberId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// First child of `parent` matching `member_id`, or matching by
    /// `name` when no id is given.
    pub fn child_matching(
        &self,
        parent: MemberId,
        member_id: Option<&str>,
        name: &str,
    ) -> Option<MemberId> {
        self.children(parent).iter().copied().find(|c| {
            let Some(member) = self.get(*c) else {
                return false;
            };
            match member_id {
                Some(wanted) => member.id() == Some(wanted),
                None => member.name() == name,
            }
        })
    }

    /// The subtree at `id` as a catalog definition (`items` nested).
    pub fn to_definition(&self, id: MemberId) -> Value {
        let Some(member) = self.get(id) else {
            return Value::Null;
        };
        let mut json = member.to_json();
        if member.is_group() {
            let items = self
                .children(id)
                .iter()
                .map(|c| self.to_definition(*c))
                .collect();
            json.insert(ITEMS_KEY.to_string(), Value::Array(items));
        }
        Value::Object(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::CatalogItem;

    fn group(name: &str) -> CatalogMember {
        CatalogMember::Group(CatalogGroup::new(MemberInfo::new("group", name)))
    }

    fn item(name: &str) -> CatalogMember {
        CatalogMember::Item(CatalogItem::new(MemberInfo::new("item", name)))
    }

    #[test]
    fn root_is_open_and_named() {
        let tree = CatalogTree::new();
        let root = tree.get(tree.root()).unwrap();
        assert_eq!(root.name(), ROOT_GROUP_NAME);
        assert!(root.is_open());
        assert!(tree.is_empty());
        assert_eq!(tree.path_of(tree.root()), "Root Group");
    }

    #[test]
    fn path_joins_ancestor_names() {
        let mut tree = CatalogTree::new();
        let g = tree.add_child(tree.root(), group("Group")).unwrap();
        let i = tree.add_child(g, item("Item")).unwrap();

        assert_eq!(tree.path_of(i), "Root Group/Group/Item");
        assert_eq!(tree.find("Root Group/Group/Item"), Some(i));
        assert_eq!(tree.find("Root Group/Group"), Some(g));
        assert_eq!(tree.find("Root Group/Item"), None);
    }

    #[test]
    fn id_takes_precedence_over_path() {
        let mut tree = CatalogTree::new();
        let a = tree.add_child(tree.root(), item("B")).unwrap();
        let mut b = item("X");
        b.info_mut().id = Some("Root Group/B".to_string());
        let b = tree.add_child(tree.root(), b).unwrap();

        assert_eq!(tree.find("Root Group/B"), Some(b));
        assert_eq!(tree.find_by_path("Root Group/B"), Some(a));
        assert_eq!(tree.address_of(b), "Root Group/B");
        assert_eq!(tree.address_of(a), "Root Group/B");
    }

    #[test]
    fn same_named_siblings_resolve_to_first() {
        let mut tree = CatalogTree::new();
        let first = tree.add_child(tree.root(), item("C")).unwrap();
        let _second = tree.add_child(tree.root(), item("C")).unwrap();
        assert_eq!(tree.find("Root Group/C"), Some(first));
    }

    #[test]
    fn names_containing_separator_still_resolve() {
        let mut tree = CatalogTree::new();
        let g = tree.add_child(tree.root(), group("A/B")).unwrap();
        let i = tree.add_child(g, item("C")).unwrap();
        assert_eq!(tree.find("Root Group/A/B/C"), Some(i));
    }

    #[test]
    fn items_cannot_have_children() {
        let mut tree = CatalogTree::new();
        let i = tree.add_child(tree.root(), item("Item")).unwrap();
        assert!(tree.add_child(i, item("Nested")).is_err());
    }

    #[test]
    fn insert_child_keeps_order() {
        let mut tree = CatalogTree::new();
        let root = tree.root();
        let a = tree.add_child(root, item("a")).unwrap();
        let c = tree.add_child(root, item("c")).unwrap();
        let b = tree.insert_child(root, 1, item("b")).unwrap();
        assert_eq!(tree.children(root), &[a, b, c]);
    }

    #[test]
    fn remove_drops_subtree() {
        let mut tree = CatalogTree::new();
        let g = tree.add_child(tree.root(), group("Group")).unwrap();
        let i = tree.add_child(g, item("Item")).unwrap();
        assert_eq!(tree.len(), 3);

        let removed = tree.remove(g).unwrap();
        assert_eq!(removed.name(), "Group");
        assert!(tree.get(i).is_none());
        assert_eq!(tree.len(), 1);
        assert!(tree.remove(tree.root()).is_none());
    }

    #[test]
    fn flag_setters_respect_variant() {
        let mut tree = CatalogTree::new();
        let g = tree.add_child(tree.root(), group("Group")).unwrap();
        let i = tree.add_child(g, item("Item")).unwrap();

        assert!(tree.set_open(g, true));
        assert!(!tree.set_open(i, true));
        assert!(tree.set_enabled(i, true));
        assert!(!tree.set_enabled(g, true));
        assert!(tree.get(g).unwrap().is_open());
        assert!(tree.get(i).unwrap().is_enabled());
    }

    #[test]
    fn descendants_are_pre_order() {
        let mut tree = CatalogTree::new();
        let root = tree.root();
        let g = tree.add_child(root, group("g")).unwrap();
        let g1 = tree.add_child(g, item("g1")).unwrap();
        let h = tree.add_child(root, item("h")).unwrap();
        assert_eq!(tree.descendants(root), vec![g, g1, h]);
    }
}
