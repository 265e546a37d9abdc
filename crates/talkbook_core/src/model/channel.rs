//! Named media slots shared by all nodes of a Document.
//!
//! # Invariants
//! - Channel uids are unique within one manager.
//! - Listing order is creation (or registration) order.

use super::DocumentId;
use crate::media::{Media, MediaType};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Media category a channel accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Text,
    Audio,
    Image,
    Video,
    Any,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Video => "video",
            Self::Any => "any",
        }
    }

    pub fn accepts(&self, media_type: MediaType) -> bool {
        matches!(
            (self, media_type),
            (Self::Any, _)
                | (Self::Text, MediaType::Text)
                | (Self::Audio, MediaType::Audio)
                | (Self::Image, MediaType::Image)
                | (Self::Video, MediaType::Video)
        )
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "audio" => Ok(Self::Audio),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "any" | "" => Ok(Self::Any),
            other => Err(format!(
                "unsupported channel kind `{other}`; expected text|audio|image|video|any"
            )),
        }
    }
}

/// Named media slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    uid: String,
    name: String,
    language: Option<String>,
    kind: ChannelKind,
    document: DocumentId,
}

impl Channel {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: Option<String>) {
        self.language = language;
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// Whether every media type carried by `media` fits this channel.
    pub fn accepts(&self, media: &Media) -> bool {
        media
            .media_types()
            .into_iter()
            .all(|media_type| self.kind.accepts(media_type))
    }
}

/// Ordered channel registry of one Document.
#[derive(Debug, Clone)]
pub struct ChannelsManager {
    document: DocumentId,
    channels: Vec<Channel>,
    next_index: u64,
}

impl ChannelsManager {
    pub(crate) fn new(document: DocumentId) -> Self {
        Self {
            document,
            channels: Vec::new(),
            next_index: 0,
        }
    }

    pub(crate) fn create(&mut self, name: &str, kind: ChannelKind) -> String {
        let mut uid = format!("CH{}", self.next_index);
        while self.get(&uid).is_some() {
            self.next_index += 1;
            uid = format!("CH{}", self.next_index);
        }
        self.next_index += 1;
        self.channels.push(Channel {
            uid: uid.clone(),
            name: name.to_string(),
            language: None,
            kind,
            document: self.document,
        });
        uid
    }

    /// Registers a channel read from a document. Returns `false` on duplicate uid.
    pub(crate) fn register_existing(
        &mut self,
        uid: &str,
        name: &str,
        language: Option<String>,
        kind: ChannelKind,
    ) -> bool {
        if self.get(uid).is_some() {
            return false;
        }
        self.channels.push(Channel {
            uid: uid.to_string(),
            name: name.to_string(),
            language,
            kind,
            document: self.document,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.uid == uid)
    }

    pub fn get_mut(&mut self, uid: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|channel| channel.uid == uid)
    }

    /// First channel with `name`, in creation order.
    pub fn find_by_name(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    /// First channel with `name` whose kind matches `kind` exactly.
    pub fn find_by_name_and_kind(&self, name: &str, kind: ChannelKind) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|channel| channel.name == name && channel.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn uids(&self) -> Vec<String> {
        self.channels.iter().map(|channel| channel.uid.clone()).collect()
    }

    pub(crate) fn remove(&mut self, uid: &str) -> Option<Channel> {
        let position = self.channels.iter().position(|channel| channel.uid == uid)?;
        Some(self.channels.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelKind, ChannelsManager};
    use crate::media::MediaType;
    use crate::model::DocumentId;

    #[test]
    fn uids_are_unique_and_order_is_stable() {
        let mut manager = ChannelsManager::new(DocumentId::new());
        assert!(manager.register_existing("CH0", "text", None, ChannelKind::Text));
        let audio = manager.create("audio", ChannelKind::Audio);
        let image = manager.create("image", ChannelKind::Image);
        assert_ne!(audio, "CH0");
        assert_ne!(audio, image);
        assert!(!manager.register_existing(&image, "dup", None, ChannelKind::Any));

        let names: Vec<&str> = manager.iter().map(|channel| channel.name()).collect();
        assert_eq!(names, vec!["text", "audio", "image"]);

        let removed = manager.remove(&audio).expect("channel should exist");
        assert_eq!(removed.name(), "audio");
        assert!(manager.find_by_name("audio").is_none());
    }

    #[test]
    fn kind_accepts_matching_media_types() {
        assert!(ChannelKind::Any.accepts(MediaType::Video));
        assert!(ChannelKind::Text.accepts(MediaType::Text));
        assert!(!ChannelKind::Audio.accepts(MediaType::Image));
        assert_eq!("Audio".parse::<ChannelKind>().unwrap(), ChannelKind::Audio);
        assert!("smell".parse::<ChannelKind>().is_err());
    }
}
