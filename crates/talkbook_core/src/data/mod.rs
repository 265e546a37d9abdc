//! File-backed binary payload storage.
//!
//! # Responsibility
//! - Allocate uid-keyed data providers inside one data directory.
//! - Enforce single-writer / multi-reader stream discipline per provider.
//!
//! # Invariants
//! - A provider MIME type never changes after creation.
//! - A provider is deleted only when no stream on it is open.
//! - Deleting a provider deregisters it and removes its backing file.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod manager;
mod provider;

pub use manager::DataProviderManager;
pub use provider::{DataProvider, ProviderReader, ProviderWriter};

pub type DataResult<T> = Result<T, DataError>;

/// Errors from data provider storage operations.
#[derive(Debug)]
pub enum DataError {
    /// Underlying file-system failure.
    Io(std::io::Error),
    /// No provider is registered under this uid.
    ProviderNotFound(String),
    /// A provider with this uid is already registered.
    DuplicateUid(String),
    /// MIME type does not look like `type/subtype`.
    InvalidMimeType(String),
    /// Provider file name is empty or escapes the data directory.
    InvalidFileName(String),
    /// A second write stream was requested.
    WriterAlreadyOpen(String),
    /// A write stream was requested while read streams are open.
    ReadersOpen { uid: String, readers: usize },
    /// A read stream was requested while the write stream is open.
    WriterOpen(String),
    /// Delete was requested while streams are open.
    StreamsOpen {
        uid: String,
        readers: usize,
        writer: bool,
    },
    /// Backing file is absent at the expected location.
    MissingFile { uid: String, path: PathBuf },
}

impl Display for DataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::ProviderNotFound(uid) => write!(f, "data provider not found: {uid}"),
            Self::DuplicateUid(uid) => write!(f, "data provider uid already registered: {uid}"),
            Self::InvalidMimeType(value) => write!(f, "invalid mime type `{value}`"),
            Self::InvalidFileName(value) => write!(f, "invalid data file name `{value}`"),
            Self::WriterAlreadyOpen(uid) => {
                write!(f, "data provider {uid} already has an open write stream")
            }
            Self::ReadersOpen { uid, readers } => write!(
                f,
                "data provider {uid} has {readers} open read stream(s); cannot open writer"
            ),
            Self::WriterOpen(uid) => {
                write!(f, "data provider {uid} is being written; cannot open reader")
            }
            Self::StreamsOpen {
                uid,
                readers,
                writer,
            } => write!(
                f,
                "data provider {uid} cannot be deleted with open streams (readers={readers}, writer={writer})"
            ),
            Self::MissingFile { uid, path } => write!(
                f,
                "data file for provider {uid} is missing: {}",
                path.display()
            ),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DataError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
