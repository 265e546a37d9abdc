//! Document: one self-contained content tree with its managers.
//!
//! # Responsibility
//! - Own the node arena, channels, media data, data providers, type
//!   registry, base locator, metadata and change log.
//! - Act as the factory for every model object of this Document.
//!
//! # Invariants
//! - Every object created here records this Document's id; objects from
//!   another Document are rejected with `ForeignObject`.
//! - Factories fail with `FactoryCannotCreateType` when the registry does
//!   not support the requested type.
//! - Every mutating operation validates before it mutates and appends one
//!   or more `ChangeEvent`s.

use crate::data::{DataError, DataProviderManager};
use crate::factory::{names, QualifiedName, TypeRegistry};
use crate::media::{
    ExternalKind, ExternalMedia, ManagedAudioMedia, ManagedImageMedia, Media, MediaDataManager,
    MediaError, PcmFormat, SequenceMedia, TextMedia, Time,
};
use crate::model::metadata::{remove_entries, set_entry};
use crate::model::tree::NodeArena;
use crate::model::{
    ChangeEvent, Channel, ChannelKind, ChannelsManager, ChannelsProperty, DocumentId, Metadata,
    NodeId, Property, StructureProperty,
};
use crate::xuk::XukConfig;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use url::Url;

mod copy;
mod tree_ops;

pub use copy::GarbageReport;
pub use tree_ops::Descendants;

pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors from Document model operations.
#[derive(Debug)]
pub enum DocumentError {
    /// Operation needs a root node but none is set.
    NoRoot,
    /// `set_root` called while a root is already set.
    RootAlreadySet(NodeId),
    /// Node id no longer refers to a live node.
    StaleNode(NodeId),
    /// Argument violates a documented precondition.
    InvalidArgument(String),
    IndexOutOfRange { index: usize, len: usize },
    /// Registry does not support the requested qualified name.
    FactoryCannotCreateType(QualifiedName),
    /// Object belongs to another Document.
    ForeignObject,
    /// Node already has a parent or is the root.
    NodeAlreadyAttached(NodeId),
    /// Node has no parent and is not the root.
    NodeNotAttached(NodeId),
    NotAChild { parent: NodeId, child: NodeId },
    /// Insertion would make a node its own ancestor.
    CycleDetected { parent: NodeId, child: NodeId },
    ChannelNotFound(String),
    /// Property value is held by another node.
    PropertyAlreadyOwned(NodeId),
    /// Channel kind does not accept the media type.
    IncompatibleMedia {
        channel: String,
        media: &'static str,
    },
    Media(MediaError),
    Data(DataError),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRoot => write!(f, "document has no root node"),
            Self::RootAlreadySet(root) => write!(f, "document root is already set to {root}"),
            Self::StaleNode(node) => write!(f, "node is no longer live: {node}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for {len} children")
            }
            Self::FactoryCannotCreateType(name) => {
                write!(f, "factory cannot create type {name}")
            }
            Self::ForeignObject => write!(f, "object belongs to another document"),
            Self::NodeAlreadyAttached(node) => write!(f, "node is already attached: {node}"),
            Self::NodeNotAttached(node) => write!(f, "node is not attached: {node}"),
            Self::NotAChild { parent, child } => {
                write!(f, "{child} is not a child of {parent}")
            }
            Self::CycleDetected { parent, child } => {
                write!(f, "inserting {child} under {parent} would create a cycle")
            }
            Self::ChannelNotFound(uid) => write!(f, "channel not found: {uid}"),
            Self::PropertyAlreadyOwned(owner) => {
                write!(f, "property is already owned by {owner}")
            }
            Self::IncompatibleMedia { channel, media } => {
                write!(f, "channel {channel} does not accept {media}")
            }
            Self::Media(err) => write!(f, "{err}"),
            Self::Data(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Media(err) => Some(err),
            Self::Data(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MediaError> for DocumentError {
    fn from(value: MediaError) -> Self {
        Self::Media(value)
    }
}

impl From<DataError> for DocumentError {
    fn from(value: DataError) -> Self {
        Self::Data(value)
    }
}

/// One content tree plus the managers it references.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    nodes: NodeArena,
    root: Option<NodeId>,
    channels: ChannelsManager,
    media_data: MediaDataManager,
    providers: DataProviderManager,
    registry: TypeRegistry,
    base_uri: Option<Url>,
    metadata: Vec<Metadata>,
    changes: Vec<ChangeEvent>,
}

impl Document {
    /// Creates an empty Document rooted at the absolute directory `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> DocumentResult<Self> {
        Self::with_config(base_dir, &XukConfig::default())
    }

    /// Creates an empty Document using `config` for namespace and data directory.
    ///
    /// # Errors
    /// - `InvalidArgument` when `base_dir` is not absolute.
    pub fn with_config(base_dir: impl AsRef<Path>, config: &XukConfig) -> DocumentResult<Self> {
        let base_dir = base_dir.as_ref();
        let base_uri = Url::from_directory_path(base_dir).map_err(|_| {
            DocumentError::InvalidArgument(format!(
                "document directory must be absolute, got `{}`",
                base_dir.display()
            ))
        })?;
        Ok(Self::from_parts(
            TypeRegistry::with_builtin_types(config.namespace.clone()),
            DataProviderManager::new(base_dir.join(&config.data_dir_name)),
            Some(base_uri),
        ))
    }

    pub(crate) fn from_parts(
        registry: TypeRegistry,
        providers: DataProviderManager,
        base_uri: Option<Url>,
    ) -> Self {
        let id = DocumentId::new();
        Self {
            id,
            nodes: NodeArena::new(id),
            root: None,
            channels: ChannelsManager::new(id),
            media_data: MediaDataManager::new(),
            providers,
            registry,
            base_uri,
            metadata: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// Base locator against which relative external media sources resolve.
    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    pub fn set_base_uri(&mut self, base_uri: Option<Url>) {
        self.base_uri = base_uri;
    }

    pub fn channels(&self) -> &ChannelsManager {
        &self.channels
    }

    pub fn channel(&self, uid: &str) -> DocumentResult<&Channel> {
        self.channels
            .get(uid)
            .ok_or_else(|| DocumentError::ChannelNotFound(uid.to_string()))
    }

    /// Mutable access for renaming or relabeling a channel.
    pub fn channel_mut(&mut self, uid: &str) -> DocumentResult<&mut Channel> {
        self.channels
            .get_mut(uid)
            .ok_or_else(|| DocumentError::ChannelNotFound(uid.to_string()))
    }

    pub fn media_data(&self) -> &MediaDataManager {
        &self.media_data
    }

    pub fn media_data_mut(&mut self) -> &mut MediaDataManager {
        &mut self.media_data
    }

    pub fn providers(&self) -> &DataProviderManager {
        &self.providers
    }

    /// Both stores at once, for media data operations that write providers.
    pub fn media_stores_mut(&mut self) -> (&mut MediaDataManager, &mut DataProviderManager) {
        (&mut self.media_data, &mut self.providers)
    }

    pub(crate) fn providers_mut(&mut self) -> &mut DataProviderManager {
        &mut self.providers
    }

    pub(crate) fn channels_mut(&mut self) -> &mut ChannelsManager {
        &mut self.channels
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    pub fn add_metadata(&mut self, name: &str, content: &str) {
        self.metadata.push(Metadata::new(name, content));
        self.record(ChangeEvent::MetadataChanged {
            name: name.to_string(),
        });
    }

    /// Replaces every entry named `name` with a single entry.
    pub fn set_metadata(&mut self, name: &str, content: &str) {
        set_entry(&mut self.metadata, name, content);
        self.record(ChangeEvent::MetadataChanged {
            name: name.to_string(),
        });
    }

    pub fn remove_metadata(&mut self, name: &str) -> usize {
        let removed = remove_entries(&mut self.metadata, name);
        if removed > 0 {
            self.record(ChangeEvent::MetadataChanged {
                name: name.to_string(),
            });
        }
        removed
    }

    /// Events recorded since the last drain, oldest first.
    pub fn changes(&self) -> &[ChangeEvent] {
        &self.changes
    }

    pub fn drain_changes(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn record(&mut self, event: ChangeEvent) {
        self.changes.push(event);
    }

    pub(crate) fn ensure_creatable(&self, local_name: &str) -> DocumentResult<()> {
        if !self.registry.supports_local(local_name) {
            return Err(DocumentError::FactoryCannotCreateType(
                self.registry.qualify(local_name),
            ));
        }
        Ok(())
    }

    pub fn create_node(&mut self) -> DocumentResult<NodeId> {
        self.ensure_creatable(names::TREE_NODE)?;
        Ok(self.nodes.allocate())
    }

    pub fn create_channels_property(&self) -> DocumentResult<ChannelsProperty> {
        self.ensure_creatable(names::CHANNELS_PROPERTY)?;
        Ok(ChannelsProperty::new(self.id))
    }

    pub fn create_structure_property(
        &self,
        local_name: &str,
        namespace: &str,
    ) -> DocumentResult<StructureProperty> {
        self.ensure_creatable(names::STRUCTURE_PROPERTY)?;
        StructureProperty::new(self.id, local_name, namespace)
    }

    pub fn create_channel(&mut self, name: &str, kind: ChannelKind) -> DocumentResult<String> {
        self.ensure_creatable(names::CHANNEL)?;
        let uid = self.channels.create(name, kind);
        self.record(ChangeEvent::ChannelAdded {
            channel: uid.clone(),
        });
        Ok(uid)
    }

    pub fn create_text_media(&self, text: &str) -> DocumentResult<Media> {
        self.ensure_creatable(names::TEXT_MEDIA)?;
        Ok(Media::Text(TextMedia::new(text.to_string())))
    }

    pub fn create_external_media(&self, kind: ExternalKind, src: &str) -> DocumentResult<Media> {
        let media = Media::External(ExternalMedia::new(kind, src.to_string()));
        self.ensure_creatable(media.local_name())?;
        Ok(media)
    }

    /// Wraps existing audio media data of this Document.
    pub fn create_managed_audio(&self, media_data: &str) -> DocumentResult<Media> {
        self.ensure_creatable(names::MANAGED_AUDIO_MEDIA)?;
        self.media_data.audio(media_data)?;
        Ok(Media::ManagedAudio(ManagedAudioMedia::new(
            self.id,
            media_data.to_string(),
        )))
    }

    /// Wraps existing image media data of this Document.
    pub fn create_managed_image(&self, media_data: &str) -> DocumentResult<Media> {
        self.ensure_creatable(names::MANAGED_IMAGE_MEDIA)?;
        self.media_data.image(media_data)?;
        Ok(Media::ManagedImage(ManagedImageMedia::new(
            self.id,
            media_data.to_string(),
        )))
    }

    pub fn create_sequence_media(&self, allow_multiple_types: bool) -> DocumentResult<SequenceMedia> {
        self.ensure_creatable(names::SEQUENCE_MEDIA)?;
        Ok(SequenceMedia::new(self.id, allow_multiple_types))
    }

    /// Creates empty audio media data; `None` uses the manager's default format.
    pub fn create_audio_media_data(&mut self, format: Option<PcmFormat>) -> DocumentResult<String> {
        self.ensure_creatable(names::WAV_AUDIO_MEDIA_DATA)?;
        self.ensure_creatable(names::FILE_DATA_PROVIDER)?;
        let uid = self.media_data.create_audio(format)?;
        self.record(ChangeEvent::MediaDataAdded { uid: uid.clone() });
        Ok(uid)
    }

    pub fn create_image_media_data(&mut self, mime_type: &str, bytes: &[u8]) -> DocumentResult<String> {
        self.ensure_creatable(names::IMAGE_MEDIA_DATA)?;
        self.ensure_creatable(names::FILE_DATA_PROVIDER)?;
        let uid = self
            .media_data
            .create_image(&mut self.providers, mime_type, bytes)?;
        self.record(ChangeEvent::MediaDataAdded { uid: uid.clone() });
        Ok(uid)
    }

    pub fn append_audio(&mut self, media_data: &str, pcm: &[u8]) -> DocumentResult<()> {
        let audio = self.media_data.audio_mut(media_data)?;
        audio.append_pcm(&mut self.providers, pcm)?;
        self.record(ChangeEvent::MediaDataChanged {
            uid: media_data.to_string(),
        });
        Ok(())
    }

    pub fn insert_audio(&mut self, media_data: &str, at: Time, pcm: &[u8]) -> DocumentResult<()> {
        let audio = self.media_data.audio_mut(media_data)?;
        audio.insert_pcm(&mut self.providers, at, pcm)?;
        self.record(ChangeEvent::MediaDataChanged {
            uid: media_data.to_string(),
        });
        Ok(())
    }

    pub fn remove_audio(
        &mut self,
        media_data: &str,
        begin: Time,
        end: Option<Time>,
    ) -> DocumentResult<()> {
        let audio = self.media_data.audio_mut(media_data)?;
        audio.remove_pcm(&self.providers, begin, end)?;
        self.record(ChangeEvent::MediaDataChanged {
            uid: media_data.to_string(),
        });
        Ok(())
    }

    pub fn read_audio(
        &self,
        media_data: &str,
        begin: Time,
        end: Option<Time>,
    ) -> DocumentResult<Vec<u8>> {
        let audio = self.media_data.audio(media_data)?;
        Ok(audio.read_pcm(&self.providers, begin, end)?)
    }

    pub fn audio_duration(&self, media_data: &str) -> DocumentResult<Time> {
        let audio = self.media_data.audio(media_data)?;
        Ok(audio.duration(&self.providers)?)
    }

    /// Resolves an external media source against this Document's base locator.
    pub fn resolve_external(&self, media: &ExternalMedia) -> DocumentResult<Url> {
        Ok(media.resolve(self.base_uri.as_ref())?)
    }
}

impl From<ChannelsProperty> for Property {
    fn from(value: ChannelsProperty) -> Self {
        Property::Channels(value)
    }
}

impl From<StructureProperty> for Property {
    fn from(value: StructureProperty) -> Self {
        Property::Structure(value)
    }
}
