//! XUK persistence: XML serialization of a whole Project.
//!
//! # Responsibility
//! - Write every Document of a Project in a fixed element order.
//! - Read it back, resolving manager sections before the tree so every
//!   uid reference is checked.
//!
//! # Invariants
//! - Elements outside the configured namespace and unknown child elements
//!   are skipped on read.
//! - A uid reference that does not resolve is a hard failure.
//! - Provider files are never moved on save; the data directory is stored
//!   relative to the `.xuk` file when possible.

use crate::data::DataError;
use crate::document::DocumentError;
use crate::factory::DEFAULT_NAMESPACE;
use crate::media::MediaError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod reader;
mod writer;

pub(crate) use reader::read_project;
pub(crate) use writer::write_project;

/// Element and attribute names of the wire format that are not type names.
pub(crate) mod tags {
    pub const XUK: &str = "Xuk";
    pub const PROJECT: &str = "Project";
    pub const METADATA: &str = "Metadata";
    pub const META: &str = "Meta";
    pub const PRESENTATIONS: &str = "Presentations";
    pub const PRESENTATION: &str = "Presentation";
    pub const ROOT_NODE: &str = "RootNode";
    pub const PROPERTIES: &str = "Properties";
    pub const CHILDREN: &str = "Children";
    pub const CHANNELS_MANAGER: &str = "ChannelsManager";
    pub const DATA_PROVIDER_MANAGER: &str = "DataProviderManager";
    pub const MEDIA_DATA_MANAGER: &str = "MediaDataManager";
    pub const DEFAULT_PCM_FORMAT: &str = "DefaultPCMFormat";
    pub const PCM_FORMAT: &str = "PCMFormat";
    pub const WAV_CLIPS: &str = "WavClips";
    pub const WAV_CLIP: &str = "WavClip";
    pub const CHANNEL_MAPPINGS: &str = "ChannelMappings";
    pub const CHANNEL_MAPPING: &str = "ChannelMapping";
    pub const ATTRIBUTES: &str = "Attributes";
    pub const ATTRIBUTE: &str = "Attribute";
    pub const ITEMS: &str = "Items";
}

pub type XukResult<T> = Result<T, XukError>;

/// Persistence settings passed explicitly to save/open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XukConfig {
    /// XML namespace of every XUK element.
    pub namespace: String,
    /// Data directory name for new Documents, relative to their base directory.
    pub data_dir_name: String,
    /// Spaces per nesting level; zero writes compact XML.
    pub indent: usize,
}

impl Default for XukConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data_dir_name: "Data".to_string(),
            indent: 2,
        }
    }
}

/// Errors from XUK save/open.
#[derive(Debug)]
pub enum XukError {
    Io(std::io::Error),
    Xml(roxmltree::Error),
    /// Document element is not `Xuk` in the configured namespace.
    UnexpectedRoot(String),
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    MissingChild {
        element: String,
        child: &'static str,
    },
    InvalidValue {
        element: String,
        attribute: &'static str,
        value: String,
    },
    /// Reference to a channel, provider or media data uid that is not declared.
    UnresolvedUid {
        kind: &'static str,
        uid: String,
    },
    Document(DocumentError),
}

impl Display for XukError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Xml(err) => write!(f, "malformed xuk markup: {err}"),
            Self::UnexpectedRoot(name) => write!(f, "unexpected xuk root element `{name}`"),
            Self::MissingAttribute { element, attribute } => {
                write!(f, "element `{element}` is missing attribute `{attribute}`")
            }
            Self::MissingChild { element, child } => {
                write!(f, "element `{element}` is missing child `{child}`")
            }
            Self::InvalidValue {
                element,
                attribute,
                value,
            } => write!(
                f,
                "element `{element}` has invalid `{attribute}` value `{value}`"
            ),
            Self::UnresolvedUid { kind, uid } => write!(f, "unresolved {kind} uid `{uid}`"),
            Self::Document(err) => write!(f, "{err}"),
        }
    }
}

impl Error for XukError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Xml(err) => Some(err),
            Self::Document(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for XukError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<roxmltree::Error> for XukError {
    fn from(value: roxmltree::Error) -> Self {
        Self::Xml(value)
    }
}

impl From<DocumentError> for XukError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

impl From<MediaError> for XukError {
    fn from(value: MediaError) -> Self {
        Self::Document(DocumentError::Media(value))
    }
}

impl From<DataError> for XukError {
    fn from(value: DataError) -> Self {
        Self::Document(DocumentError::Data(value))
    }
}

#[cfg(test)]
mod tests {
    use super::XukConfig;

    #[test]
    fn config_round_trips_through_json_with_defaults() {
        let config: XukConfig = serde_json::from_str(r#"{"indent":0}"#).unwrap();
        assert_eq!(config.indent, 0);
        assert_eq!(config.data_dir_name, "Data");
        assert_eq!(config.namespace, XukConfig::default().namespace);

        let json = serde_json::to_string(&XukConfig::default()).unwrap();
        assert!(json.contains("\"dataDirName\":\"Data\""));
    }
}
