//! Tree navigation, structural edits and node property/media access.
//!
//! # Invariants
//! - A node has at most one parent; the root has none.
//! - Insertion rejects attached nodes and nodes that are ancestors of the
//!   target parent.
//! - Iterators borrow the Document immutably, so structural edits during
//!   iteration are compile-time errors.

use super::{Document, DocumentError, DocumentResult};
use crate::media::Media;
use crate::model::tree::NodeData;
use crate::model::{
    ChangeEvent, Channel, ChannelsProperty, NodeId, Property, PropertyKind, StructureProperty,
};

/// Pre-order walk over one subtree.
pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        if let Some(data) = self.document.nodes.get(next) {
            self.stack.extend(data.children.iter().rev().copied());
        }
        Some(next)
    }
}

impl Document {
    pub(crate) fn node(&self, id: NodeId) -> DocumentResult<&NodeData> {
        if id.document() != self.id {
            return Err(DocumentError::ForeignObject);
        }
        self.nodes.get(id).ok_or(DocumentError::StaleNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> DocumentResult<&mut NodeData> {
        if id.document() != self.id {
            return Err(DocumentError::ForeignObject);
        }
        self.nodes.get_mut(id).ok_or(DocumentError::StaleNode(id))
    }

    /// Whether `id` is a live node of this Document, attached or not.
    pub fn contains_node(&self, id: NodeId) -> bool {
        id.document() == self.id && self.nodes.contains(id)
    }

    /// Number of live nodes, including detached subtrees.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn live_nodes(&self) -> Vec<NodeId> {
        self.nodes.live_ids()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn require_root(&self) -> DocumentResult<NodeId> {
        self.root.ok_or(DocumentError::NoRoot)
    }

    /// Makes a detached node the root.
    ///
    /// # Errors
    /// - `RootAlreadySet` when a root exists; call `take_root` first.
    /// - `NodeAlreadyAttached` when the node has a parent.
    pub fn set_root(&mut self, node: NodeId) -> DocumentResult<()> {
        if let Some(root) = self.root {
            return Err(DocumentError::RootAlreadySet(root));
        }
        if self.node(node)?.parent.is_some() {
            return Err(DocumentError::NodeAlreadyAttached(node));
        }
        self.root = Some(node);
        self.record(ChangeEvent::RootChanged {
            old: None,
            new: Some(node),
        });
        Ok(())
    }

    /// Unsets the root, leaving its subtree detached but live.
    pub fn take_root(&mut self) -> Option<NodeId> {
        let old = self.root.take()?;
        self.record(ChangeEvent::RootChanged {
            old: Some(old),
            new: None,
        });
        Some(old)
    }

    pub fn parent(&self, node: NodeId) -> DocumentResult<Option<NodeId>> {
        Ok(self.node(node)?.parent)
    }

    pub fn children(&self, node: NodeId) -> DocumentResult<&[NodeId]> {
        Ok(&self.node(node)?.children)
    }

    pub fn child_count(&self, node: NodeId) -> DocumentResult<usize> {
        Ok(self.node(node)?.children.len())
    }

    pub fn child_at(&self, parent: NodeId, index: usize) -> DocumentResult<NodeId> {
        let children = &self.node(parent)?.children;
        children
            .get(index)
            .copied()
            .ok_or(DocumentError::IndexOutOfRange {
                index,
                len: children.len(),
            })
    }

    pub fn index_of(&self, parent: NodeId, child: NodeId) -> DocumentResult<usize> {
        self.node(parent)?
            .children
            .iter()
            .position(|candidate| *candidate == child)
            .ok_or(DocumentError::NotAChild { parent, child })
    }

    /// Whether the node is the root or has a parent.
    pub fn is_attached(&self, node: NodeId) -> DocumentResult<bool> {
        Ok(self.root == Some(node) || self.node(node)?.parent.is_some())
    }

    /// Inserts a detached node as child `index` of `parent`.
    ///
    /// # Errors
    /// - `IndexOutOfRange` when `index > child_count(parent)`.
    /// - `NodeAlreadyAttached` when `child` has a parent or is the root.
    /// - `CycleDetected` when `child` is `parent` or one of its ancestors.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> DocumentResult<()> {
        let len = self.node(parent)?.children.len();
        if self.is_attached(child)? {
            return Err(DocumentError::NodeAlreadyAttached(child));
        }
        if index > len {
            return Err(DocumentError::IndexOutOfRange { index, len });
        }
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(DocumentError::CycleDetected { parent, child });
            }
            cursor = self.node(current)?.parent;
        }

        self.node_mut(parent)?.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        self.record(ChangeEvent::ChildInserted {
            parent,
            child,
            index,
        });
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DocumentResult<()> {
        let index = self.child_count(parent)?;
        self.insert_child(parent, index, child)
    }

    /// Detaches a node from its parent (or unsets it as root).
    pub fn detach(&mut self, node: NodeId) -> DocumentResult<()> {
        if self.root == Some(node) {
            self.take_root();
            return Ok(());
        }
        let parent = self
            .node(node)?
            .parent
            .ok_or(DocumentError::NodeNotAttached(node))?;
        let index = self.index_of(parent, node)?;
        self.remove_child_at(parent, index).map(|_| ())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DocumentResult<()> {
        let index = self.index_of(parent, child)?;
        self.remove_child_at(parent, index).map(|_| ())
    }

    /// Detaches child `index` of `parent` and returns it.
    pub fn remove_child_at(&mut self, parent: NodeId, index: usize) -> DocumentResult<NodeId> {
        let child = self.child_at(parent, index)?;
        self.node_mut(parent)?.children.remove(index);
        self.node_mut(child)?.parent = None;
        self.record(ChangeEvent::ChildRemoved {
            parent,
            child,
            index,
        });
        Ok(child)
    }

    /// Frees every node of a detached subtree. Its ids become stale.
    ///
    /// Media data referenced by the subtree stays until `collect_garbage`.
    pub fn destroy_subtree(&mut self, node: NodeId) -> DocumentResult<usize> {
        if self.is_attached(node)? {
            return Err(DocumentError::NodeAlreadyAttached(node));
        }
        let doomed: Vec<NodeId> = self.descendants(node)?.collect();
        for id in &doomed {
            self.nodes.release(*id);
        }
        Ok(doomed.len())
    }

    /// Pre-order walk starting at (and including) `node`.
    pub fn descendants(&self, node: NodeId) -> DocumentResult<Descendants<'_>> {
        self.node(node)?;
        Ok(Descendants {
            document: self,
            stack: vec![node],
        })
    }

    /// Number of ancestors; zero for the root and detached subtree tops.
    pub fn depth(&self, node: NodeId) -> DocumentResult<usize> {
        let mut depth = 0;
        let mut cursor = self.node(node)?.parent;
        while let Some(current) = cursor {
            depth += 1;
            cursor = self.node(current)?.parent;
        }
        Ok(depth)
    }

    pub fn next_sibling(&self, node: NodeId) -> DocumentResult<Option<NodeId>> {
        let Some(parent) = self.node(node)?.parent else {
            return Ok(None);
        };
        let index = self.index_of(parent, node)?;
        Ok(self.node(parent)?.children.get(index + 1).copied())
    }

    pub fn previous_sibling(&self, node: NodeId) -> DocumentResult<Option<NodeId>> {
        let Some(parent) = self.node(node)?.parent else {
            return Ok(None);
        };
        let index = self.index_of(parent, node)?;
        if index == 0 {
            return Ok(None);
        }
        Ok(self.node(parent)?.children.get(index - 1).copied())
    }

    /// Stores a property on `node`, replacing one of the same kind.
    ///
    /// # Errors
    /// - `ForeignObject` when the property was created by another Document.
    /// - `PropertyAlreadyOwned` when another node holds the value.
    /// - `ChannelNotFound` / `IncompatibleMedia` for channel mappings that no
    ///   longer fit this Document's channels.
    pub fn set_property(
        &mut self,
        node: NodeId,
        property: impl Into<Property>,
    ) -> DocumentResult<Option<Property>> {
        let mut property = property.into();
        self.node(node)?;
        if property.document() != self.id {
            return Err(DocumentError::ForeignObject);
        }
        if let Some(owner) = property.owner() {
            if owner != node {
                return Err(DocumentError::PropertyAlreadyOwned(owner));
            }
        }
        if let Property::Channels(channels) = &property {
            for (channel_uid, media) in channels.iter() {
                self.validate_mapping(channel_uid, media)?;
            }
        }

        let kind = property.kind();
        property.set_owner(Some(node));
        let replaced = self.node_mut(node)?.put_property(property).map(|mut old| {
            old.set_owner(None);
            old
        });
        self.record(ChangeEvent::PropertySet { node, kind });
        Ok(replaced)
    }

    pub fn property(&self, node: NodeId, kind: PropertyKind) -> DocumentResult<Option<&Property>> {
        Ok(self.node(node)?.property(kind))
    }

    pub fn properties(&self, node: NodeId) -> DocumentResult<&[Property]> {
        Ok(&self.node(node)?.properties)
    }

    pub fn channels_property(&self, node: NodeId) -> DocumentResult<Option<&ChannelsProperty>> {
        Ok(self
            .node(node)?
            .property(PropertyKind::Channels)
            .and_then(Property::as_channels))
    }

    pub fn structure_property(&self, node: NodeId) -> DocumentResult<Option<&StructureProperty>> {
        Ok(self
            .node(node)?
            .property(PropertyKind::Structure)
            .and_then(Property::as_structure))
    }

    pub fn structure_property_mut(
        &mut self,
        node: NodeId,
    ) -> DocumentResult<Option<&mut StructureProperty>> {
        Ok(match self.node_mut(node)?.property_mut(PropertyKind::Structure) {
            Some(Property::Structure(property)) => Some(property),
            _ => None,
        })
    }

    /// Removes and returns one property; the returned value is unowned.
    pub fn remove_property(
        &mut self,
        node: NodeId,
        kind: PropertyKind,
    ) -> DocumentResult<Option<Property>> {
        let removed = self.node_mut(node)?.take_property(kind).map(|mut property| {
            property.set_owner(None);
            property
        });
        if removed.is_some() {
            self.record(ChangeEvent::PropertyRemoved { node, kind });
        }
        Ok(removed)
    }

    /// Maps `media` onto `channel_uid` of `node`, creating the channels
    /// property when absent. Returns the replaced media.
    pub fn set_media(
        &mut self,
        node: NodeId,
        channel_uid: &str,
        media: Media,
    ) -> DocumentResult<Option<Media>> {
        self.node(node)?;
        self.validate_mapping(channel_uid, &media)?;
        let needs_property = self.node(node)?.property(PropertyKind::Channels).is_none();
        if needs_property {
            let property = self.create_channels_property()?;
            self.set_property(node, property)?;
        }
        let replaced = match self.node_mut(node)?.property_mut(PropertyKind::Channels) {
            Some(Property::Channels(property)) => {
                property.insert_unchecked(channel_uid.to_string(), media)
            }
            _ => None,
        };
        self.record(ChangeEvent::MediaSet {
            node,
            channel: channel_uid.to_string(),
        });
        Ok(replaced)
    }

    pub fn media(&self, node: NodeId, channel_uid: &str) -> DocumentResult<Option<&Media>> {
        Ok(self
            .channels_property(node)?
            .and_then(|property| property.media(channel_uid)))
    }

    /// Media on the first channel named `name`.
    pub fn media_by_channel_name(&self, node: NodeId, name: &str) -> DocumentResult<Option<&Media>> {
        let channel = self
            .channels
            .find_by_name(name)
            .ok_or_else(|| DocumentError::ChannelNotFound(name.to_string()))?;
        self.media(node, channel.uid())
    }

    pub fn remove_media(&mut self, node: NodeId, channel_uid: &str) -> DocumentResult<Option<Media>> {
        let removed = match self.node_mut(node)?.property_mut(PropertyKind::Channels) {
            Some(Property::Channels(property)) => property.remove_media(channel_uid),
            _ => None,
        };
        if removed.is_some() {
            self.record(ChangeEvent::MediaRemoved {
                node,
                channel: channel_uid.to_string(),
            });
        }
        Ok(removed)
    }

    /// Removes a channel and every mapping to it on every live node.
    pub fn remove_channel(&mut self, channel_uid: &str) -> DocumentResult<Channel> {
        self.channel(channel_uid)?;
        for node in self.live_nodes() {
            self.remove_media(node, channel_uid)?;
        }
        let channel = self
            .channels
            .remove(channel_uid)
            .ok_or_else(|| DocumentError::ChannelNotFound(channel_uid.to_string()))?;
        self.record(ChangeEvent::ChannelRemoved {
            channel: channel_uid.to_string(),
        });
        Ok(channel)
    }

    fn validate_mapping(&self, channel_uid: &str, media: &Media) -> DocumentResult<()> {
        let channel = self.channel(channel_uid)?;
        if !media.belongs_to(self.id) {
            return Err(DocumentError::ForeignObject);
        }
        if !channel.accepts(media) {
            return Err(DocumentError::IncompatibleMedia {
                channel: channel_uid.to_string(),
                media: media.local_name(),
            });
        }
        for uid in media.media_data_uids() {
            if !self.media_data.contains(&uid) {
                return Err(crate::media::MediaError::MediaDataNotFound(uid).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::document::{Document, DocumentError};
    use crate::model::{ChangeEvent, ChannelKind, PropertyKind};

    fn document() -> (tempfile::TempDir, Document) {
        let dir = tempfile::tempdir().unwrap();
        let document = Document::new(dir.path()).unwrap();
        (dir, document)
    }

    #[test]
    fn insert_and_navigate_children() {
        let (_dir, mut doc) = document();
        let root = doc.create_node().unwrap();
        doc.set_root(root).unwrap();
        let a = doc.create_node().unwrap();
        let b = doc.create_node().unwrap();
        let c = doc.create_node().unwrap();
        doc.append_child(root, a).unwrap();
        doc.append_child(root, c).unwrap();
        doc.insert_child(root, 1, b).unwrap();

        assert_eq!(doc.children(root).unwrap(), &[a, b, c]);
        assert_eq!(doc.index_of(root, c).unwrap(), 2);
        assert_eq!(doc.next_sibling(a).unwrap(), Some(b));
        assert_eq!(doc.previous_sibling(a).unwrap(), None);
        assert_eq!(doc.depth(b).unwrap(), 1);
        assert_eq!(
            doc.descendants(root).unwrap().collect::<Vec<_>>(),
            vec![root, a, b, c]
        );

        let extra = doc.create_node().unwrap();
        let err = doc.insert_child(root, 9, extra).unwrap_err();
        assert!(matches!(err, DocumentError::IndexOutOfRange { index: 9, len: 3 }));
    }

    #[test]
    fn structural_violations_are_rejected() {
        let (_dir, mut doc) = document();
        let root = doc.create_node().unwrap();
        doc.set_root(root).unwrap();
        let child = doc.create_node().unwrap();
        doc.append_child(root, child).unwrap();

        let err = doc.append_child(root, child).unwrap_err();
        assert!(matches!(err, DocumentError::NodeAlreadyAttached(_)));

        let top = doc.create_node().unwrap();
        let below = doc.create_node().unwrap();
        doc.append_child(top, below).unwrap();
        let err = doc.append_child(below, top).unwrap_err();
        assert!(matches!(err, DocumentError::CycleDetected { .. }));

        let err = doc.set_root(top).unwrap_err();
        assert!(matches!(err, DocumentError::RootAlreadySet(_)));
    }

    #[test]
    fn detach_and_destroy_make_ids_stale() {
        let (_dir, mut doc) = document();
        let root = doc.create_node().unwrap();
        doc.set_root(root).unwrap();
        let child = doc.create_node().unwrap();
        let grandchild = doc.create_node().unwrap();
        doc.append_child(root, child).unwrap();
        doc.append_child(child, grandchild).unwrap();

        doc.detach(child).unwrap();
        assert_eq!(doc.parent(child).unwrap(), None);
        assert_eq!(doc.child_count(root).unwrap(), 0);
        assert_eq!(doc.destroy_subtree(child).unwrap(), 2);
        assert!(matches!(
            doc.parent(grandchild).unwrap_err(),
            DocumentError::StaleNode(_)
        ));
        assert!(doc.contains_node(root));
        assert!(!doc.contains_node(child));

        let loose = doc.create_node().unwrap();
        let err = doc.detach(loose).unwrap_err();
        assert!(matches!(err, DocumentError::NodeNotAttached(_)));
    }

    #[test]
    fn properties_are_owned_by_one_node() {
        let (_dir, mut doc) = document();
        let first = doc.create_node().unwrap();
        let second = doc.create_node().unwrap();
        let structure = doc.create_structure_property("p", "").unwrap();
        doc.set_property(first, structure).unwrap();

        let owned = doc
            .property(first, PropertyKind::Structure)
            .unwrap()
            .cloned()
            .unwrap();
        assert_eq!(owned.owner(), Some(first));
        let err = doc.set_property(second, owned.clone()).unwrap_err();
        assert!(matches!(err, DocumentError::PropertyAlreadyOwned(_)));
        doc.set_property(second, owned.to_unowned()).unwrap();

        let removed = doc.remove_property(first, PropertyKind::Structure).unwrap();
        assert_eq!(removed.unwrap().owner(), None);
        assert!(doc.properties(first).unwrap().is_empty());
    }

    #[test]
    fn foreign_nodes_and_properties_are_rejected() {
        let (_dir, mut doc) = document();
        let (_other_dir, mut other) = document();
        let node = doc.create_node().unwrap();
        let foreign = other.create_node().unwrap();
        assert!(matches!(
            doc.append_child(node, foreign).unwrap_err(),
            DocumentError::ForeignObject
        ));
        let property = other.create_structure_property("p", "").unwrap();
        assert!(matches!(
            doc.set_property(node, property).unwrap_err(),
            DocumentError::ForeignObject
        ));
    }

    #[test]
    fn set_media_checks_channel_kind() {
        let (_dir, mut doc) = document();
        let node = doc.create_node().unwrap();
        let audio = doc.create_channel("audio", ChannelKind::Audio).unwrap();
        let text = doc.create_text_media("hi").unwrap();
        let err = doc.set_media(node, &audio, text).unwrap_err();
        assert!(matches!(err, DocumentError::IncompatibleMedia { .. }));

        let text = doc.create_text_media("hi").unwrap();
        let err = doc.set_media(node, "CH-missing", text).unwrap_err();
        assert!(matches!(err, DocumentError::ChannelNotFound(_)));
    }

    #[test]
    fn mutations_are_recorded_in_order() {
        let (_dir, mut doc) = document();
        let root = doc.create_node().unwrap();
        doc.set_root(root).unwrap();
        let child = doc.create_node().unwrap();
        doc.append_child(root, child).unwrap();
        doc.remove_child_at(root, 0).unwrap();
        assert_eq!(
            doc.drain_changes(),
            vec![
                ChangeEvent::RootChanged {
                    old: None,
                    new: Some(root)
                },
                ChangeEvent::ChildInserted {
                    parent: root,
                    child,
                    index: 0
                },
                ChangeEvent::ChildRemoved {
                    parent: root,
                    child,
                    index: 0
                },
            ]
        );
    }
}
