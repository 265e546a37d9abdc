//! Change events recorded by mutating Document operations.

use super::property::PropertyKind;
use super::tree::NodeId;

/// One observable model mutation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    RootChanged {
        old: Option<NodeId>,
        new: Option<NodeId>,
    },
    ChildInserted {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    ChildRemoved {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    PropertySet {
        node: NodeId,
        kind: PropertyKind,
    },
    PropertyRemoved {
        node: NodeId,
        kind: PropertyKind,
    },
    MediaSet {
        node: NodeId,
        channel: String,
    },
    MediaRemoved {
        node: NodeId,
        channel: String,
    },
    ChannelAdded {
        channel: String,
    },
    ChannelRemoved {
        channel: String,
    },
    MediaDataAdded {
        uid: String,
    },
    MediaDataRemoved {
        uid: String,
    },
    /// Audio content of existing media data was edited.
    MediaDataChanged {
        uid: String,
    },
    DataProviderRemoved {
        uid: String,
    },
    MetadataChanged {
        name: String,
    },
}
