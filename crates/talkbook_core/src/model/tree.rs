//! Generational node arena backing one Document's tree.
//!
//! # Invariants
//! - A `NodeId` is valid only while its slot generation matches.
//! - Freed slots are reused with a bumped generation, so stale ids never
//!   alias a new node.

use super::property::{Property, PropertyKind};
use super::DocumentId;
use std::fmt::{Display, Formatter};

/// Handle to one tree node inside a Document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    document: DocumentId,
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NodeData {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) properties: Vec<Property>,
}

impl NodeData {
    pub(crate) fn property(&self, kind: PropertyKind) -> Option<&Property> {
        self.properties.iter().find(|property| property.kind() == kind)
    }

    pub(crate) fn property_mut(&mut self, kind: PropertyKind) -> Option<&mut Property> {
        self.properties
            .iter_mut()
            .find(|property| property.kind() == kind)
    }

    /// Stores `property`, replacing one of the same kind. Returns the replaced value.
    pub(crate) fn put_property(&mut self, property: Property) -> Option<Property> {
        match self
            .properties
            .iter()
            .position(|existing| existing.kind() == property.kind())
        {
            Some(position) => Some(std::mem::replace(&mut self.properties[position], property)),
            None => {
                self.properties.push(property);
                self.properties.sort_by_key(Property::kind);
                None
            }
        }
    }

    pub(crate) fn take_property(&mut self, kind: PropertyKind) -> Option<Property> {
        let position = self
            .properties
            .iter()
            .position(|property| property.kind() == kind)?;
        Some(self.properties.remove(position))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeArena {
    document: DocumentId,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl NodeArena {
    pub(crate) fn new(document: DocumentId) -> Self {
        Self {
            document,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn allocate(&mut self) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(NodeData::default());
            return NodeId {
                document: self.document,
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            data: Some(NodeData::default()),
        });
        NodeId {
            document: self.document,
            index,
            generation: 0,
        }
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&NodeData> {
        if id.document != self.document {
            return None;
        }
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.data.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        if id.document != self.document {
            return None;
        }
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.data.as_mut()
    }

    /// Frees one slot; the caller keeps parent/child links consistent.
    pub(crate) fn release(&mut self, id: NodeId) -> Option<NodeData> {
        if !self.contains(id) {
            return None;
        }
        let slot = &mut self.slots[id.index as usize];
        let data = slot.data.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        data
    }

    /// Ids of every live node, attached or not, in slot order.
    pub(crate) fn live_ids(&self) -> Vec<NodeId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.data.is_some())
            .map(|(index, slot)| NodeId {
                document: self.document,
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.data.is_some()).count()
    }
}
