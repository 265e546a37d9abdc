//! Audio import session with per-source memoization.
//!
//! # Responsibility
//! - Convert external audio files to PCM once per import operation.
//! - Turn each import into fresh managed audio media of a Document.
//! - Clean up media data the session created but the Document no longer uses.
//!
//! # Invariants
//! - A source path is converted at most once per session; later imports
//!   duplicate the first converted provider instead.
//! - `finish` only removes media data created by this session.

use crate::data::DataError;
use crate::document::{Document, DocumentError};
use crate::media::{Media, MediaError, PcmFormat, WavHeader};
use crate::model::ChangeEvent;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

pub type ConversionResult<T> = Result<T, ConversionError>;

/// Errors from audio conversion and import.
#[derive(Debug)]
pub enum ConversionError {
    Io { path: PathBuf, source: std::io::Error },
    /// Source decoded to something that is not usable PCM.
    Media(MediaError),
    Document(DocumentError),
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read audio source `{}`: {source}", path.display())
            }
            Self::Media(err) => write!(f, "{err}"),
            Self::Document(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConversionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Media(err) => Some(err),
            Self::Document(err) => Some(err),
        }
    }
}

impl From<MediaError> for ConversionError {
    fn from(value: MediaError) -> Self {
        Self::Media(value)
    }
}

impl From<DocumentError> for ConversionError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

impl From<DataError> for ConversionError {
    fn from(value: DataError) -> Self {
        Self::Document(DocumentError::Data(value))
    }
}

/// Decoded PCM payload of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedAudio {
    pub format: PcmFormat,
    pub pcm: Vec<u8>,
}

/// Decodes an external audio file into PCM.
pub trait AudioConverter {
    fn convert(&self, source: &Path) -> ConversionResult<ConvertedAudio>;
}

/// Converter for RIFF/WAVE PCM files.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavFileConverter;

impl AudioConverter for WavFileConverter {
    fn convert(&self, source: &Path) -> ConversionResult<ConvertedAudio> {
        let io_error = |source_err| ConversionError::Io {
            path: source.to_path_buf(),
            source: source_err,
        };
        let mut reader = BufReader::new(File::open(source).map_err(io_error)?);
        let header = WavHeader::parse(&mut reader)?;
        let mut pcm = Vec::new();
        reader
            .take(header.data_len)
            .read_to_end(&mut pcm)
            .map_err(io_error)?;
        if pcm.len() as u64 != header.data_len {
            return Err(MediaError::InvalidWavHeader(format!(
                "data chunk declares {} bytes, file holds {}",
                header.data_len,
                pcm.len()
            ))
            .into());
        }
        Ok(ConvertedAudio {
            format: header.format,
            pcm,
        })
    }
}

#[derive(Debug, Clone)]
struct Converted {
    format: PcmFormat,
    provider: Option<String>,
}

/// One import operation over a Document.
#[derive(Debug)]
pub struct ConversionSession<C: AudioConverter> {
    converter: C,
    converted: HashMap<PathBuf, Converted>,
    created: Vec<String>,
    conversions: usize,
}

impl<C: AudioConverter> ConversionSession<C> {
    pub fn new(converter: C) -> Self {
        Self {
            converter,
            converted: HashMap::new(),
            created: Vec::new(),
            conversions: 0,
        }
    }

    /// Number of sources actually converted so far.
    pub fn conversions(&self) -> usize {
        self.conversions
    }

    /// Media data uids created by this session, in creation order.
    pub fn created_media_data(&self) -> &[String] {
        &self.created
    }

    /// Imports `source` as new managed audio media of `document`.
    pub fn import_audio(&mut self, document: &mut Document, source: &Path) -> ConversionResult<Media> {
        let key = source_key(source);
        let memo = self
            .converted
            .get(&key)
            .filter(|memo| match &memo.provider {
                Some(provider) => document.providers().contains(provider),
                None => true,
            })
            .cloned();

        let uid = match memo {
            Some(memo) => {
                let uid = document.create_audio_media_data(Some(memo.format))?;
                if let Some(provider) = memo.provider {
                    let (media_data, providers) = document.media_stores_mut();
                    let duplicate = providers.duplicate(&provider)?;
                    media_data.audio_mut(&uid)?.append_provider(providers, &duplicate)?;
                    document.record(ChangeEvent::MediaDataChanged { uid: uid.clone() });
                }
                debug!(
                    "event=audio_import module=conversion status=ok cached=true media_data={uid}"
                );
                uid
            }
            None => {
                let converted = self.converter.convert(source)?;
                self.conversions += 1;
                let uid = document.create_audio_media_data(Some(converted.format))?;
                document.append_audio(&uid, &converted.pcm)?;
                let provider = document
                    .media_data()
                    .audio(&uid)?
                    .clips()
                    .first()
                    .map(|clip| clip.provider().to_string());
                self.converted.insert(
                    key,
                    Converted {
                        format: converted.format,
                        provider,
                    },
                );
                debug!(
                    "event=audio_import module=conversion status=ok cached=false media_data={uid}"
                );
                uid
            }
        };
        self.created.push(uid.clone());
        Ok(document.create_managed_audio(&uid)?)
    }

    /// Ends the session, removing session-created media data that no live
    /// node of `document` references, together with providers only they owned.
    ///
    /// Returns the removed media data uids.
    pub fn finish(self, document: &mut Document) -> ConversionResult<Vec<String>> {
        let referenced = document.referenced_media_data();
        let doomed: Vec<String> = self
            .created
            .iter()
            .filter(|uid| !referenced.contains(*uid) && document.media_data().contains(uid))
            .cloned()
            .collect();

        let kept_providers: HashSet<String> = document
            .media_data()
            .iter()
            .filter(|media_data| !doomed.iter().any(|uid| uid == media_data.uid()))
            .flat_map(|media_data| media_data.provider_uids())
            .collect();
        let mut doomed_providers = Vec::new();
        for uid in &doomed {
            let Some(media_data) = document.media_data().get(uid) else {
                continue;
            };
            for provider in media_data.provider_uids() {
                if kept_providers.contains(&provider) || doomed_providers.contains(&provider) {
                    continue;
                }
                let Some(entry) = document.providers().get(&provider) else {
                    continue;
                };
                if !entry.is_closed() {
                    return Err(DataError::StreamsOpen {
                        uid: provider,
                        readers: entry.open_readers(),
                        writer: entry.has_open_writer(),
                    }
                    .into());
                }
                doomed_providers.push(provider);
            }
        }

        for uid in &doomed {
            document.media_data_mut().remove(uid);
            document.record(ChangeEvent::MediaDataRemoved { uid: uid.clone() });
        }
        let mut removed_providers = Vec::new();
        for provider in doomed_providers {
            document.providers_mut().delete(&provider)?;
            document.record(ChangeEvent::DataProviderRemoved {
                uid: provider.clone(),
            });
            removed_providers.push(provider);
        }
        info!(
            "event=conversion_session_end module=conversion status=ok conversions={} imported={} removed_media_data={} removed_providers={}",
            self.conversions,
            self.created.len(),
            doomed.len(),
            removed_providers.len()
        );
        Ok(doomed)
    }
}

fn source_key(source: &Path) -> PathBuf {
    std::fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::{
        AudioConverter, ConversionError, ConversionResult, ConversionSession, ConvertedAudio,
        WavFileConverter,
    };
    use crate::document::Document;
    use crate::media::{MediaError, PcmFormat, WavHeader};
    use std::cell::Cell;
    use std::path::Path;

    struct CountingConverter {
        calls: Cell<usize>,
    }

    impl AudioConverter for CountingConverter {
        fn convert(&self, _source: &Path) -> ConversionResult<ConvertedAudio> {
            self.calls.set(self.calls.get() + 1);
            Ok(ConvertedAudio {
                format: PcmFormat::new(1, 8_000, 8).unwrap(),
                pcm: vec![7; 16],
            })
        }
    }

    #[test]
    fn repeated_sources_are_converted_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut document = Document::new(dir.path()).unwrap();
        let converter = CountingConverter { calls: Cell::new(0) };
        let mut session = ConversionSession::new(converter);

        let source = dir.path().join("a.mp3");
        let first = session.import_audio(&mut document, &source).unwrap();
        let second = session.import_audio(&mut document, &source).unwrap();
        assert_eq!(session.conversions(), 1);
        assert_eq!(session.converter.calls.get(), 1);
        assert_ne!(first.media_data_uids(), second.media_data_uids());
        assert!(document.media_value_eq(&first, &document, &second).unwrap());
        assert_eq!(document.providers().len(), 2);
    }

    #[test]
    fn wav_converter_reads_pcm_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let format = PcmFormat::new(2, 8_000, 16).unwrap();
        let mut bytes = Vec::new();
        WavHeader::write(&format, 8, &mut bytes).unwrap();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        std::fs::write(&path, bytes).unwrap();

        let converted = WavFileConverter.convert(&path).unwrap();
        assert_eq!(converted.format, format);
        assert_eq!(converted.pcm, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(WavFileConverter.convert(&dir.path().join("missing.wav")).is_err());
    }

    #[test]
    fn wav_converter_rejects_a_data_chunk_longer_than_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        let format = PcmFormat::new(1, 8_000, 16).unwrap();
        let mut bytes = Vec::new();
        WavHeader::write(&format, 0xFFFF_0000, &mut bytes).unwrap();
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        std::fs::write(&path, bytes).unwrap();

        let err = WavFileConverter.convert(&path).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Media(MediaError::InvalidWavHeader(_))
        ));
    }
}
