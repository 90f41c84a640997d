//! Catalog tree, member type registry and the share-link codec.
//!
//! The usual flow: build a [`TypeRegistry`] at startup, load a catalog
//! definition into a [`CatalogTree`], then go through a [`ShareContext`] to
//! turn the tree into a share link or to restore one onto a tree.

pub mod config;
pub mod deserialize;
pub mod error;
pub mod loader;
pub mod member;
pub mod registry;
pub mod serialize;
pub mod share;
pub mod tree;
pub mod url_codec;
pub mod whitelist;

pub use config::ShareConfig;
pub use deserialize::{ApplyOptions, DanglingPolicy, apply_share_map, apply_share_state, apply_user_properties};
pub use error::{CatalogError, MemberFailure, ShareReport};
pub use loader::{load_catalog, update_from_json};
pub use member::{CatalogGroup, CatalogItem, CatalogMember, LoadStatus, MemberInfo, Properties};
pub use registry::{BoxFuture, FnFactory, MemberFactory, MemberInit, TypeRegistry};
pub use serialize::{ShareMap, ShareState, serialize_share_map, serialize_share_state};
pub use share::ShareContext;
pub use tree::{CatalogTree, MemberId};
pub use url_codec::{DecodedShare, SharePayload};
pub use whitelist::{AmbientWhitelist, PropertyWhitelist, UserProperties};
