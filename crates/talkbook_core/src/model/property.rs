//! Node properties: channel-to-media mappings and structural XML names.
//!
//! # Invariants
//! - A node holds at most one property per `PropertyKind`.
//! - A ChannelsProperty maps each channel uid to at most one media.
//! - StructureProperty names and attribute names are XML NCNames.

use super::channel::Channel;
use super::tree::NodeId;
use super::DocumentId;
use crate::document::{DocumentError, DocumentResult};
use crate::factory::names;
use crate::media::Media;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static NCNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9._-]*$").expect("ncname pattern is valid")
});

/// Whether `value` is a (ASCII subset) XML NCName.
pub fn is_ncname(value: &str) -> bool {
    NCNAME_RE.is_match(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyKind {
    Channels,
    Structure,
}

/// Closed set of node properties.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Channels(ChannelsProperty),
    Structure(StructureProperty),
}

impl Property {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Channels(_) => PropertyKind::Channels,
            Self::Structure(_) => PropertyKind::Structure,
        }
    }

    pub fn local_name(&self) -> &'static str {
        match self {
            Self::Channels(_) => names::CHANNELS_PROPERTY,
            Self::Structure(_) => names::STRUCTURE_PROPERTY,
        }
    }

    pub fn document(&self) -> DocumentId {
        match self {
            Self::Channels(property) => property.document,
            Self::Structure(property) => property.document,
        }
    }

    /// Node currently holding this value, if any.
    pub fn owner(&self) -> Option<NodeId> {
        match self {
            Self::Channels(property) => property.owner,
            Self::Structure(property) => property.owner,
        }
    }

    pub(crate) fn set_owner(&mut self, owner: Option<NodeId>) {
        match self {
            Self::Channels(property) => property.owner = owner,
            Self::Structure(property) => property.owner = owner,
        }
    }

    /// Unowned copy sharing media data uids with the original.
    ///
    /// Use `Document::copy_property` for a copy with fresh media data.
    pub fn to_unowned(&self) -> Property {
        let mut copy = self.clone();
        copy.set_owner(None);
        copy
    }

    pub fn as_channels(&self) -> Option<&ChannelsProperty> {
        match self {
            Self::Channels(property) => Some(property),
            Self::Structure(_) => None,
        }
    }

    pub fn as_structure(&self) -> Option<&StructureProperty> {
        match self {
            Self::Structure(property) => Some(property),
            Self::Channels(_) => None,
        }
    }
}

/// Channel uid to media mapping of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelsProperty {
    document: DocumentId,
    owner: Option<NodeId>,
    mappings: BTreeMap<String, Media>,
}

impl ChannelsProperty {
    pub(crate) fn new(document: DocumentId) -> Self {
        Self {
            document,
            owner: None,
            mappings: BTreeMap::new(),
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn media(&self, channel_uid: &str) -> Option<&Media> {
        self.mappings.get(channel_uid)
    }

    pub fn media_mut(&mut self, channel_uid: &str) -> Option<&mut Media> {
        self.mappings.get_mut(channel_uid)
    }

    /// Channel uids with media, sorted.
    pub fn channel_uids(&self) -> Vec<String> {
        self.mappings.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Media)> {
        self.mappings
            .iter()
            .map(|(channel, media)| (channel.as_str(), media))
    }

    /// Maps `media` onto `channel`, returning the replaced media.
    ///
    /// # Errors
    /// - `ForeignObject` when channel or media belong to another Document.
    /// - `IncompatibleMedia` when the channel does not accept the media type.
    pub fn set_media(&mut self, channel: &Channel, media: Media) -> DocumentResult<Option<Media>> {
        if channel.document() != self.document || !media.belongs_to(self.document) {
            return Err(DocumentError::ForeignObject);
        }
        if !channel.accepts(&media) {
            return Err(DocumentError::IncompatibleMedia {
                channel: channel.uid().to_string(),
                media: media.local_name(),
            });
        }
        Ok(self.mappings.insert(channel.uid().to_string(), media))
    }

    pub fn remove_media(&mut self, channel_uid: &str) -> Option<Media> {
        self.mappings.remove(channel_uid)
    }

    pub(crate) fn insert_unchecked(&mut self, channel_uid: String, media: Media) -> Option<Media> {
        self.mappings.insert(channel_uid, media)
    }
}

/// One attribute of a structure property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: String,
    pub namespace: String,
    pub value: String,
}

/// Qualified XML element name plus attributes carried by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureProperty {
    document: DocumentId,
    owner: Option<NodeId>,
    local_name: String,
    namespace: String,
    attributes: Vec<XmlAttribute>,
}

impl StructureProperty {
    pub(crate) fn new(
        document: DocumentId,
        local_name: &str,
        namespace: &str,
    ) -> DocumentResult<Self> {
        ensure_ncname(local_name)?;
        Ok(Self {
            document,
            owner: None,
            local_name: local_name.to_string(),
            namespace: namespace.to_string(),
            attributes: Vec::new(),
        })
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_name(&mut self, local_name: &str, namespace: &str) -> DocumentResult<()> {
        ensure_ncname(local_name)?;
        self.local_name = local_name.to_string();
        self.namespace = namespace.to_string();
        Ok(())
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str, namespace: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name && attribute.namespace == namespace)
            .map(|attribute| attribute.value.as_str())
    }

    /// Sets one attribute, replacing an existing `(name, namespace)` entry.
    pub fn set_attribute(
        &mut self,
        name: &str,
        namespace: &str,
        value: impl Into<String>,
    ) -> DocumentResult<Option<String>> {
        ensure_ncname(name)?;
        let value = value.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|attribute| attribute.name == name && attribute.namespace == namespace)
        {
            return Ok(Some(std::mem::replace(&mut existing.value, value)));
        }
        self.attributes.push(XmlAttribute {
            name: name.to_string(),
            namespace: namespace.to_string(),
            value,
        });
        Ok(None)
    }

    pub fn remove_attribute(&mut self, name: &str, namespace: &str) -> Option<String> {
        let position = self
            .attributes
            .iter()
            .position(|attribute| attribute.name == name && attribute.namespace == namespace)?;
        Some(self.attributes.remove(position).value)
    }
}

fn ensure_ncname(value: &str) -> DocumentResult<()> {
    if !is_ncname(value) {
        return Err(DocumentError::InvalidArgument(format!(
            "`{value}` is not a valid XML name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{is_ncname, StructureProperty};
    use crate::document::DocumentError;
    use crate::model::DocumentId;

    #[test]
    fn ncname_validation() {
        assert!(is_ncname("level1"));
        assert!(is_ncname("_x.y-z"));
        assert!(!is_ncname("1abc"));
        assert!(!is_ncname("a:b"));
        assert!(!is_ncname(""));
    }

    #[test]
    fn structure_attributes_are_unique_per_qualified_name() {
        let mut property = StructureProperty::new(DocumentId::new(), "h1", "").unwrap();
        assert_eq!(property.set_attribute("id", "", "a").unwrap(), None);
        assert_eq!(
            property.set_attribute("id", "", "b").unwrap(),
            Some("a".to_string())
        );
        property.set_attribute("id", "urn:x", "c").unwrap();
        assert_eq!(property.attributes().len(), 2);
        assert_eq!(property.attribute("id", ""), Some("b"));
        assert_eq!(property.remove_attribute("id", "urn:x"), Some("c".to_string()));

        let err = property.set_attribute("bad name", "", "v").unwrap_err();
        assert!(matches!(err, DocumentError::InvalidArgument(_)));
    }
}
