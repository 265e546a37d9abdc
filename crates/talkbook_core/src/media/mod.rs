//! Media content units attached to tree nodes through channels.
//!
//! # Responsibility
//! - Define the closed set of media variants (inline text, external
//!   references, managed audio/image, sequences).
//! - Define typed binary payloads (`MediaData`) built on data providers.
//!
//! # Invariants
//! - External media reference a URI and never own bytes.
//! - Managed media reference exactly one media data uid of their Document.
//! - Sequence items share one media type unless mixed types are allowed.

use crate::data::DataError;
use crate::factory::names;
use crate::model::DocumentId;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use url::Url;

pub mod data;
pub mod pcm;
pub mod wav;

pub use data::{ImageMediaData, MediaData, MediaDataManager, WavAudioMediaData, WavClip};
pub use pcm::{PcmFormat, Time};
pub use wav::WavHeader;

pub type MediaResult<T> = Result<T, MediaError>;

/// Errors from media and media data operations.
#[derive(Debug)]
pub enum MediaError {
    Io(std::io::Error),
    Data(DataError),
    InvalidPcmFormat(String),
    InvalidWavHeader(String),
    PcmFormatMismatch {
        expected: PcmFormat,
        actual: PcmFormat,
    },
    MisalignedByteCount {
        bytes: u64,
        block_align: u32,
    },
    TimeOutOfRange {
        time: Time,
        duration: Time,
    },
    InvalidClip(String),
    MediaDataNotFound(String),
    DuplicateUid(String),
    WrongMediaDataKind {
        uid: String,
        expected: &'static str,
    },
    InvalidMimeType(String),
    InvalidUri(String),
    MixedSequenceTypes {
        expected: MediaType,
        actual: MediaType,
    },
    ForeignMedia,
}

impl Display for MediaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Data(err) => write!(f, "{err}"),
            Self::InvalidPcmFormat(message) => write!(f, "invalid pcm format: {message}"),
            Self::InvalidWavHeader(message) => write!(f, "invalid wav header: {message}"),
            Self::PcmFormatMismatch { expected, actual } => {
                write!(f, "pcm format mismatch: expected {expected}, got {actual}")
            }
            Self::MisalignedByteCount { bytes, block_align } => write!(
                f,
                "byte count {bytes} is not aligned to block size {block_align}"
            ),
            Self::TimeOutOfRange { time, duration } => {
                write!(f, "time {time} is outside media duration {duration}")
            }
            Self::InvalidClip(message) => write!(f, "invalid wav clip: {message}"),
            Self::MediaDataNotFound(uid) => write!(f, "media data not found: {uid}"),
            Self::DuplicateUid(uid) => write!(f, "media data uid already registered: {uid}"),
            Self::WrongMediaDataKind { uid, expected } => {
                write!(f, "media data {uid} is not {expected}")
            }
            Self::InvalidMimeType(value) => write!(f, "invalid image mime type `{value}`"),
            Self::InvalidUri(value) => write!(f, "cannot resolve media uri `{value}`"),
            Self::MixedSequenceTypes { expected, actual } => write!(
                f,
                "sequence holds {expected} media; cannot add {actual} media"
            ),
            Self::ForeignMedia => write!(f, "media belongs to another document"),
        }
    }
}

impl Error for MediaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Data(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MediaError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<DataError> for MediaError {
    fn from(value: DataError) -> Self {
        Self::Data(value)
    }
}

/// Media category used by channel compatibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaType {
    Text,
    Audio,
    Image,
    Video,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Video => "video",
        };
        f.write_str(label)
    }
}

/// One media content unit.
///
/// `PartialEq` is identity-level (same media data uids); use
/// `Document::media_value_eq` for content equality.
#[derive(Debug, Clone, PartialEq)]
pub enum Media {
    Text(TextMedia),
    External(ExternalMedia),
    ManagedAudio(ManagedAudioMedia),
    ManagedImage(ManagedImageMedia),
    Sequence(SequenceMedia),
}

impl Media {
    /// Element local name identifying the concrete variant.
    pub fn local_name(&self) -> &'static str {
        match self {
            Self::Text(_) => names::TEXT_MEDIA,
            Self::External(external) => match external.kind {
                ExternalKind::Text => names::EXTERNAL_TEXT_MEDIA,
                ExternalKind::Audio { .. } => names::EXTERNAL_AUDIO_MEDIA,
                ExternalKind::Image { .. } => names::EXTERNAL_IMAGE_MEDIA,
                ExternalKind::Video { .. } => names::EXTERNAL_VIDEO_MEDIA,
            },
            Self::ManagedAudio(_) => names::MANAGED_AUDIO_MEDIA,
            Self::ManagedImage(_) => names::MANAGED_IMAGE_MEDIA,
            Self::Sequence(_) => names::SEQUENCE_MEDIA,
        }
    }

    /// Set of media types carried; empty for an empty sequence.
    pub fn media_types(&self) -> BTreeSet<MediaType> {
        let mut types = BTreeSet::new();
        self.collect_media_types(&mut types);
        types
    }

    fn collect_media_types(&self, out: &mut BTreeSet<MediaType>) {
        match self {
            Self::Text(_) => {
                out.insert(MediaType::Text);
            }
            Self::External(external) => {
                out.insert(external.kind.media_type());
            }
            Self::ManagedAudio(_) => {
                out.insert(MediaType::Audio);
            }
            Self::ManagedImage(_) => {
                out.insert(MediaType::Image);
            }
            Self::Sequence(sequence) => {
                for item in &sequence.items {
                    item.collect_media_types(out);
                }
            }
        }
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            Self::Text(media) => media.language.as_deref(),
            Self::External(media) => media.language.as_deref(),
            Self::ManagedAudio(media) => media.language.as_deref(),
            Self::ManagedImage(media) => media.language.as_deref(),
            Self::Sequence(media) => media.language.as_deref(),
        }
    }

    pub fn set_language(&mut self, language: Option<String>) {
        let slot = match self {
            Self::Text(media) => &mut media.language,
            Self::External(media) => &mut media.language,
            Self::ManagedAudio(media) => &mut media.language,
            Self::ManagedImage(media) => &mut media.language,
            Self::Sequence(media) => &mut media.language,
        };
        *slot = language;
    }

    /// Media data uids referenced by this media, including sequence items.
    pub fn media_data_uids(&self) -> Vec<String> {
        let mut uids = Vec::new();
        self.collect_media_data_uids(&mut uids);
        uids
    }

    fn collect_media_data_uids(&self, out: &mut Vec<String>) {
        match self {
            Self::ManagedAudio(media) => out.push(media.media_data.clone()),
            Self::ManagedImage(media) => out.push(media.media_data.clone()),
            Self::Sequence(sequence) => {
                for item in &sequence.items {
                    item.collect_media_data_uids(out);
                }
            }
            Self::Text(_) | Self::External(_) => {}
        }
    }

    /// Element local names of this media and all nested media.
    pub(crate) fn collect_local_names(&self, out: &mut BTreeSet<&'static str>) {
        out.insert(self.local_name());
        if let Self::Sequence(sequence) = self {
            for item in &sequence.items {
                item.collect_local_names(out);
            }
        }
    }

    /// Whether every document-bound part of this media belongs to `document`.
    pub fn belongs_to(&self, document: DocumentId) -> bool {
        match self {
            Self::Text(_) | Self::External(_) => true,
            Self::ManagedAudio(media) => media.document == document,
            Self::ManagedImage(media) => media.document == document,
            Self::Sequence(sequence) => {
                sequence.document == document
                    && sequence.items.iter().all(|item| item.belongs_to(document))
            }
        }
    }

    /// Moves this media into `document`, mapping every media data uid through `map`.
    pub(crate) fn rebind<E>(
        &mut self,
        document: DocumentId,
        map: &mut dyn FnMut(&str) -> Result<String, E>,
    ) -> Result<(), E> {
        match self {
            Self::ManagedAudio(media) => {
                media.media_data = map(&media.media_data)?;
                media.document = document;
            }
            Self::ManagedImage(media) => {
                media.media_data = map(&media.media_data)?;
                media.document = document;
            }
            Self::Sequence(sequence) => {
                sequence.document = document;
                for item in &mut sequence.items {
                    item.rebind(document, map)?;
                }
            }
            Self::Text(_) | Self::External(_) => {}
        }
        Ok(())
    }

    /// The single media type carried, or `None` for empty or mixed sequences.
    pub fn media_type(&self) -> Option<MediaType> {
        let types = self.media_types();
        if types.len() == 1 {
            return types.into_iter().next();
        }
        None
    }

    pub fn as_text(&self) -> Option<&TextMedia> {
        match self {
            Self::Text(media) => Some(media),
            _ => None,
        }
    }
}

/// Inline text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMedia {
    text: String,
    language: Option<String>,
}

impl TextMedia {
    pub(crate) fn new(text: String) -> Self {
        Self {
            text,
            language: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

/// Variant-specific attributes of external media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Text,
    Audio {
        clip_begin: Time,
        clip_end: Option<Time>,
    },
    Image {
        width: u32,
        height: u32,
    },
    Video {
        width: u32,
        height: u32,
        clip_begin: Time,
        clip_end: Option<Time>,
    },
}

impl ExternalKind {
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Text => MediaType::Text,
            Self::Audio { .. } => MediaType::Audio,
            Self::Image { .. } => MediaType::Image,
            Self::Video { .. } => MediaType::Video,
        }
    }

    pub fn audio() -> Self {
        Self::Audio {
            clip_begin: Time::ZERO,
            clip_end: None,
        }
    }

    pub fn image() -> Self {
        Self::Image {
            width: 0,
            height: 0,
        }
    }

    pub fn video() -> Self {
        Self::Video {
            width: 0,
            height: 0,
            clip_begin: Time::ZERO,
            clip_end: None,
        }
    }
}

/// Media referenced by URI, resolved lazily against the document base locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalMedia {
    kind: ExternalKind,
    src: String,
    language: Option<String>,
}

impl ExternalMedia {
    pub(crate) fn new(kind: ExternalKind, src: String) -> Self {
        Self {
            kind,
            src,
            language: None,
        }
    }

    pub fn kind(&self) -> &ExternalKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ExternalKind {
        &mut self.kind
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn set_src(&mut self, src: impl Into<String>) {
        self.src = src.into();
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Resolves `src` to an absolute URL.
    ///
    /// Absolute sources are returned as-is; relative ones are joined onto `base`.
    pub fn resolve(&self, base: Option<&Url>) -> MediaResult<Url> {
        match Url::parse(&self.src) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => base
                .ok_or_else(|| MediaError::InvalidUri(self.src.clone()))?
                .join(&self.src)
                .map_err(|_| MediaError::InvalidUri(self.src.clone())),
            Err(_) => Err(MediaError::InvalidUri(self.src.clone())),
        }
    }
}

/// Audio media owning one audio media data of its Document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedAudioMedia {
    document: DocumentId,
    media_data: String,
    language: Option<String>,
}

impl ManagedAudioMedia {
    pub(crate) fn new(document: DocumentId, media_data: String) -> Self {
        Self {
            document,
            media_data,
            language: None,
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn media_data(&self) -> &str {
        &self.media_data
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

/// Image media owning one image media data of its Document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedImageMedia {
    document: DocumentId,
    media_data: String,
    width: u32,
    height: u32,
    language: Option<String>,
}

impl ManagedImageMedia {
    pub(crate) fn new(document: DocumentId, media_data: String) -> Self {
        Self {
            document,
            media_data,
            width: 0,
            height: 0,
            language: None,
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn media_data(&self) -> &str {
        &self.media_data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

/// Ordered list of media played/rendered in sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMedia {
    document: DocumentId,
    items: Vec<Media>,
    allow_multiple_types: bool,
    language: Option<String>,
}

impl SequenceMedia {
    pub(crate) fn new(document: DocumentId, allow_multiple_types: bool) -> Self {
        Self {
            document,
            items: Vec::new(),
            allow_multiple_types,
            language: None,
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn items(&self) -> &[Media] {
        &self.items
    }

    pub fn allow_multiple_types(&self) -> bool {
        self.allow_multiple_types
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Appends one item.
    pub fn push(&mut self, item: Media) -> MediaResult<()> {
        self.insert(self.items.len(), item)
    }

    /// Inserts one item at `index` (clamped to the end).
    ///
    /// # Errors
    /// - `ForeignMedia` when the item belongs to another Document.
    /// - `MixedSequenceTypes` when types differ and mixing is not allowed.
    pub fn insert(&mut self, index: usize, item: Media) -> MediaResult<()> {
        if !item.belongs_to(self.document) {
            return Err(MediaError::ForeignMedia);
        }
        if !self.allow_multiple_types {
            let incoming = item.media_types();
            let expected = self
                .items
                .iter()
                .flat_map(|media| media.media_types())
                .next()
                .or_else(|| incoming.iter().next().copied());
            if let Some(expected) = expected {
                if let Some(actual) = incoming.iter().copied().find(|actual| *actual != expected) {
                    return Err(MediaError::MixedSequenceTypes { expected, actual });
                }
            }
        }
        let index = index.min(self.items.len());
        self.items.insert(index, item);
        Ok(())
    }

    /// Removes and returns the item at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Media> {
        if index < self.items.len() {
            return Some(self.items.remove(index));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{ExternalKind, ExternalMedia, Media, MediaError, MediaType, SequenceMedia, TextMedia};
    use crate::model::DocumentId;
    use url::Url;

    #[test]
    fn external_media_resolves_relative_src_against_base() {
        let media = ExternalMedia::new(ExternalKind::audio(), "audio/chapter1.mp3".to_string());
        let base = Url::parse("file:///books/demo/").unwrap();
        let resolved = media.resolve(Some(&base)).unwrap();
        assert_eq!(resolved.as_str(), "file:///books/demo/audio/chapter1.mp3");

        let absolute = ExternalMedia::new(ExternalKind::Text, "https://example.org/a.txt".into());
        assert_eq!(
            absolute.resolve(None).unwrap().as_str(),
            "https://example.org/a.txt"
        );
        assert!(media.resolve(None).is_err());
    }

    #[test]
    fn sequence_rejects_mixed_types_unless_allowed() {
        let document = DocumentId::new();
        let mut strict = SequenceMedia::new(document, false);
        strict
            .push(Media::Text(TextMedia::new("a".to_string())))
            .unwrap();
        let err = strict
            .push(Media::External(ExternalMedia::new(
                ExternalKind::image(),
                "a.png".to_string(),
            )))
            .expect_err("mixed types should be rejected");
        assert!(matches!(
            err,
            MediaError::MixedSequenceTypes {
                expected: MediaType::Text,
                actual: MediaType::Image
            }
        ));

        let mut mixed = SequenceMedia::new(document, true);
        mixed
            .push(Media::Text(TextMedia::new("a".to_string())))
            .unwrap();
        mixed
            .push(Media::External(ExternalMedia::new(
                ExternalKind::image(),
                "a.png".to_string(),
            )))
            .unwrap();
        assert_eq!(Media::Sequence(mixed).media_types().len(), 2);
    }
}
