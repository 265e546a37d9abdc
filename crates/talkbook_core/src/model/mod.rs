//! Document object model building blocks.
//!
//! # Responsibility
//! - Define identities (`DocumentId`, `NodeId`) and the node arena.
//! - Define channels, properties, metadata and change events.
//!
//! # Invariants
//! - Every model object records the Document it belongs to.
//! - Parent links are arena indices, never owning references.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod change;
pub mod channel;
pub mod metadata;
pub mod property;
pub mod tree;

pub use change::ChangeEvent;
pub use channel::{Channel, ChannelKind, ChannelsManager};
pub use metadata::Metadata;
pub use property::{
    is_ncname, ChannelsProperty, Property, PropertyKind, StructureProperty, XmlAttribute,
};
pub use tree::NodeId;

/// Stable identity of one Document within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
