//! Qualified-name type registry used by Document factories.
//!
//! # Responsibility
//! - Name every persistable type by `(namespace, local name)`.
//! - Answer "can this Document create type X" for factories, export and
//!   the XUK reader.
//!
//! # Invariants
//! - A registry never holds duplicate qualified names.
//! - Local names are shared across namespaces; only the namespace differs.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Namespace used when no configuration overrides it.
pub const DEFAULT_NAMESPACE: &str = "http://www.daisy.org/urakawa/xuk/2.0";

/// Local names of every built-in type.
pub mod names {
    pub const TREE_NODE: &str = "TreeNode";
    pub const CHANNELS_PROPERTY: &str = "ChannelsProperty";
    pub const STRUCTURE_PROPERTY: &str = "StructureProperty";
    pub const CHANNEL: &str = "Channel";
    pub const TEXT_MEDIA: &str = "TextMedia";
    pub const EXTERNAL_TEXT_MEDIA: &str = "ExternalTextMedia";
    pub const EXTERNAL_AUDIO_MEDIA: &str = "ExternalAudioMedia";
    pub const EXTERNAL_IMAGE_MEDIA: &str = "ExternalImageMedia";
    pub const EXTERNAL_VIDEO_MEDIA: &str = "ExternalVideoMedia";
    pub const MANAGED_AUDIO_MEDIA: &str = "ManagedAudioMedia";
    pub const MANAGED_IMAGE_MEDIA: &str = "ManagedImageMedia";
    pub const SEQUENCE_MEDIA: &str = "SequenceMedia";
    pub const WAV_AUDIO_MEDIA_DATA: &str = "WavAudioMediaData";
    pub const IMAGE_MEDIA_DATA: &str = "ImageMediaData";
    pub const FILE_DATA_PROVIDER: &str = "FileDataProvider";

    pub const ALL: &[&str] = &[
        TREE_NODE,
        CHANNELS_PROPERTY,
        STRUCTURE_PROPERTY,
        CHANNEL,
        TEXT_MEDIA,
        EXTERNAL_TEXT_MEDIA,
        EXTERNAL_AUDIO_MEDIA,
        EXTERNAL_IMAGE_MEDIA,
        EXTERNAL_VIDEO_MEDIA,
        MANAGED_AUDIO_MEDIA,
        MANAGED_IMAGE_MEDIA,
        SEQUENCE_MEDIA,
        WAV_AUDIO_MEDIA_DATA,
        IMAGE_MEDIA_DATA,
        FILE_DATA_PROVIDER,
    ];
}

/// `(namespace, local name)` pair identifying one type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    pub namespace: String,
    pub local_name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_name)
    }
}

/// Set of qualified names one Document can instantiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistry {
    namespace: String,
    supported: BTreeSet<QualifiedName>,
}

impl TypeRegistry {
    /// Creates an empty registry for `namespace`.
    pub fn empty(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            supported: BTreeSet::new(),
        }
    }

    /// Creates a registry supporting every built-in type in `namespace`.
    pub fn with_builtin_types(namespace: impl Into<String>) -> Self {
        let mut registry = Self::empty(namespace);
        for local_name in names::ALL {
            registry.register(local_name);
        }
        registry
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn qualify(&self, local_name: &str) -> QualifiedName {
        QualifiedName::new(self.namespace.clone(), local_name)
    }

    /// Adds `local_name` in this registry's namespace. Returns `false` if present.
    pub fn register(&mut self, local_name: &str) -> bool {
        let name = self.qualify(local_name);
        self.supported.insert(name)
    }

    /// Removes `local_name`. Returns `false` if it was not registered.
    pub fn unregister(&mut self, local_name: &str) -> bool {
        let name = self.qualify(local_name);
        self.supported.remove(&name)
    }

    pub fn supports(&self, name: &QualifiedName) -> bool {
        self.supported.contains(name)
    }

    pub fn supports_local(&self, local_name: &str) -> bool {
        self.supports(&self.qualify(local_name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &QualifiedName> {
        self.supported.iter()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtin_types(DEFAULT_NAMESPACE)
    }
}
