//! Core model for talkbook projects.
//! A project holds Documents: a tree of nodes with channel-mapped media,
//! backed by managed audio/image data and persisted as XUK markup.

pub mod data;
pub mod document;
pub mod factory;
pub mod logging;
pub mod media;
pub mod model;
pub mod project;
pub mod service;
pub mod xuk;

pub use data::{DataError, DataProvider, DataProviderManager, DataResult};
pub use document::{Document, DocumentError, DocumentResult, GarbageReport};
pub use factory::{QualifiedName, TypeRegistry, DEFAULT_NAMESPACE};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use media::{
    Media, MediaData, MediaDataManager, MediaError, MediaResult, MediaType, PcmFormat, Time,
};
pub use model::{
    ChangeEvent, Channel, ChannelKind, ChannelsProperty, DocumentId, Metadata, NodeId, Property,
    StructureProperty,
};
pub use project::Project;
pub use service::conversion::{
    AudioConverter, ConversionError, ConversionSession, WavFileConverter,
};
pub use xuk::{XukConfig, XukError, XukResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
