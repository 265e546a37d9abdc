//! Typed binary payloads built on data providers.
//!
//! # Responsibility
//! - Model audio payloads as an ordered list of WAV clips plus one PCM format.
//! - Model image payloads as one provider holding the encoded image.
//! - Keep the uid-keyed registry of media data for one Document.
//!
//! # Invariants
//! - Every clip provider holds a RIFF/WAVE file whose format equals the
//!   owning media data format.
//! - All PCM byte positions handled here are block-aligned.

use super::pcm::{PcmFormat, Time};
use super::wav::WavHeader;
use super::{MediaError, MediaResult};
use crate::data::DataProviderManager;
use crate::factory::names;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom};
use uuid::Uuid;

/// MIME type of providers holding WAV clips.
pub const WAV_MIME_TYPE: &str = "audio/x-wav";

/// A span of PCM data inside one WAV provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavClip {
    provider: String,
    clip_begin: Time,
    clip_end: Option<Time>,
}

impl WavClip {
    /// Creates a clip; `clip_end == None` means "to the end of the data chunk".
    pub fn new(provider: impl Into<String>, clip_begin: Time, clip_end: Option<Time>) -> Self {
        Self {
            provider: provider.into(),
            clip_begin,
            clip_end,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn clip_begin(&self) -> Time {
        self.clip_begin
    }

    pub fn clip_end(&self) -> Option<Time> {
        self.clip_end
    }

    fn span(&self, format: &PcmFormat, providers: &DataProviderManager) -> MediaResult<ClipSpan> {
        let mut reader = providers.open_read(&self.provider)?;
        let header = WavHeader::parse(&mut reader)?;
        if header.format != *format {
            return Err(MediaError::PcmFormatMismatch {
                expected: *format,
                actual: header.format,
            });
        }
        let begin = format.bytes_for_duration(self.clip_begin);
        let end = match self.clip_end {
            Some(clip_end) => format.bytes_for_duration(clip_end),
            None => header.data_len,
        };
        if begin > end || end > header.data_len {
            return Err(MediaError::InvalidClip(format!(
                "clip [{}, {}) exceeds {} data bytes of provider {}",
                begin, end, header.data_len, self.provider
            )));
        }
        Ok(ClipSpan { header, begin, end })
    }
}

#[derive(Debug, Clone, Copy)]
struct ClipSpan {
    header: WavHeader,
    begin: u64,
    end: u64,
}

impl ClipSpan {
    fn len(&self) -> u64 {
        self.end - self.begin
    }
}

/// Audio payload: PCM format plus ordered WAV clips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavAudioMediaData {
    uid: String,
    format: PcmFormat,
    clips: Vec<WavClip>,
}

impl WavAudioMediaData {
    pub(crate) fn new(uid: String, format: PcmFormat) -> Self {
        Self {
            uid,
            format,
            clips: Vec::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn format(&self) -> &PcmFormat {
        &self.format
    }

    pub fn clips(&self) -> &[WavClip] {
        &self.clips
    }

    pub(crate) fn push_clip(&mut self, clip: WavClip) {
        self.clips.push(clip);
    }

    /// Total PCM byte length across clips.
    pub fn pcm_len(&self, providers: &DataProviderManager) -> MediaResult<u64> {
        Ok(self.spans(providers)?.iter().map(ClipSpan::len).sum())
    }

    pub fn duration(&self, providers: &DataProviderManager) -> MediaResult<Time> {
        Ok(self.format.duration_for_bytes(self.pcm_len(providers)?))
    }

    /// Checks every clip header and range against the providers.
    pub fn validate_clips(&self, providers: &DataProviderManager) -> MediaResult<()> {
        self.spans(providers).map(|_| ())
    }

    /// Appends block-aligned PCM bytes as a new clip.
    pub fn append_pcm(&mut self, providers: &mut DataProviderManager, pcm: &[u8]) -> MediaResult<()> {
        self.ensure_aligned(pcm.len() as u64)?;
        if pcm.is_empty() {
            return Ok(());
        }
        let provider = write_wav_provider(providers, &self.format, pcm)?;
        self.clips.push(WavClip::new(provider, Time::ZERO, None));
        Ok(())
    }

    /// Appends the whole data chunk of an existing WAV provider as a clip.
    pub fn append_provider(
        &mut self,
        providers: &DataProviderManager,
        provider: &str,
    ) -> MediaResult<()> {
        let clip = WavClip::new(provider, Time::ZERO, None);
        clip.span(&self.format, providers)?;
        self.clips.push(clip);
        Ok(())
    }

    /// Inserts block-aligned PCM bytes at `at`, splitting a clip if needed.
    ///
    /// # Errors
    /// - `MisalignedByteCount` for unaligned input.
    /// - `TimeOutOfRange` when `at` is beyond the current duration.
    pub fn insert_pcm(
        &mut self,
        providers: &mut DataProviderManager,
        at: Time,
        pcm: &[u8],
    ) -> MediaResult<()> {
        self.ensure_aligned(pcm.len() as u64)?;
        let spans = self.spans(providers)?;
        let total = spans.iter().map(ClipSpan::len).sum();
        let at_bytes = self.position_to_bytes(at, total)?;
        if pcm.is_empty() {
            return Ok(());
        }

        let inserted_clip = WavClip::new(
            write_wav_provider(providers, &self.format, pcm)?,
            Time::ZERO,
            None,
        );
        let mut clips = Vec::with_capacity(self.clips.len() + 2);
        let mut inserted = false;
        let mut offset = 0_u64;
        for (clip, span) in self.clips.iter().zip(spans.iter()) {
            let start = offset;
            let stop = start + span.len();
            offset = stop;
            if !inserted && at_bytes == start {
                clips.push(inserted_clip.clone());
                inserted = true;
            }
            if !inserted && at_bytes > start && at_bytes < stop {
                let split = span.begin + (at_bytes - start);
                clips.push(self.sub_clip(clip, span, span.begin, split));
                clips.push(inserted_clip.clone());
                clips.push(self.sub_clip(clip, span, split, span.end));
                inserted = true;
                continue;
            }
            clips.push(clip.clone());
        }
        if !inserted {
            clips.push(inserted_clip);
        }
        self.clips = clips;
        Ok(())
    }

    /// Removes PCM data in `[begin, end)`; `end == None` removes to the end.
    ///
    /// Providers that lose all clips stay registered until garbage collection.
    pub fn remove_pcm(
        &mut self,
        providers: &DataProviderManager,
        begin: Time,
        end: Option<Time>,
    ) -> MediaResult<()> {
        let spans = self.spans(providers)?;
        let total = spans.iter().map(ClipSpan::len).sum();
        let (range_begin, range_end) = self.byte_range(begin, end, total)?;
        if range_begin == range_end {
            return Ok(());
        }

        let mut kept = Vec::with_capacity(self.clips.len() + 1);
        let mut offset = 0_u64;
        for (clip, span) in self.clips.iter().zip(spans.iter()) {
            let start = offset;
            let stop = start + span.len();
            offset = stop;
            if stop <= range_begin || start >= range_end {
                kept.push(clip.clone());
                continue;
            }
            if start < range_begin {
                kept.push(self.sub_clip(clip, span, span.begin, span.begin + (range_begin - start)));
            }
            if stop > range_end {
                kept.push(self.sub_clip(clip, span, span.begin + (range_end - start), span.end));
            }
        }
        self.clips = kept;
        Ok(())
    }

    /// Reads PCM bytes in `[begin, end)`; `end == None` reads to the end.
    pub fn read_pcm(
        &self,
        providers: &DataProviderManager,
        begin: Time,
        end: Option<Time>,
    ) -> MediaResult<Vec<u8>> {
        let spans = self.spans(providers)?;
        let total = spans.iter().map(ClipSpan::len).sum();
        let (range_begin, range_end) = self.byte_range(begin, end, total)?;

        let mut out = Vec::with_capacity((range_end - range_begin) as usize);
        let mut offset = 0_u64;
        for (clip, span) in self.clips.iter().zip(spans.iter()) {
            let start = offset;
            let stop = start + span.len();
            offset = stop;
            let from = range_begin.max(start);
            let to = range_end.min(stop);
            if from >= to {
                continue;
            }
            let mut reader = providers.open_read(&clip.provider)?;
            reader.seek(SeekFrom::Start(
                span.header.data_offset + span.begin + (from - start),
            ))?;
            let wanted = to - from;
            let read = reader.by_ref().take(wanted).read_to_end(&mut out)? as u64;
            if read != wanted {
                return Err(MediaError::InvalidClip(format!(
                    "provider {} ended after {read} of {wanted} bytes",
                    clip.provider
                )));
            }
        }
        Ok(out)
    }

    fn spans(&self, providers: &DataProviderManager) -> MediaResult<Vec<ClipSpan>> {
        self.clips
            .iter()
            .map(|clip| clip.span(&self.format, providers))
            .collect()
    }

    fn sub_clip(&self, clip: &WavClip, span: &ClipSpan, begin: u64, end: u64) -> WavClip {
        let clip_end = if end == span.header.data_len && clip.clip_end.is_none() {
            None
        } else {
            Some(self.format.duration_for_bytes(end))
        };
        WavClip::new(
            clip.provider.clone(),
            self.format.duration_for_bytes(begin),
            clip_end,
        )
    }

    fn ensure_aligned(&self, bytes: u64) -> MediaResult<()> {
        if !self.format.is_block_aligned(bytes) {
            return Err(MediaError::MisalignedByteCount {
                bytes,
                block_align: self.format.block_align(),
            });
        }
        Ok(())
    }

    fn position_to_bytes(&self, time: Time, total: u64) -> MediaResult<u64> {
        let bytes = self.format.bytes_for_duration(time);
        if time.is_negative() || bytes > total {
            return Err(MediaError::TimeOutOfRange {
                time,
                duration: self.format.duration_for_bytes(total),
            });
        }
        Ok(bytes)
    }

    fn byte_range(&self, begin: Time, end: Option<Time>, total: u64) -> MediaResult<(u64, u64)> {
        let range_begin = self.position_to_bytes(begin, total)?;
        let range_end = match end {
            Some(end) => self.position_to_bytes(end, total)?,
            None => total,
        };
        if range_begin > range_end {
            return Err(MediaError::TimeOutOfRange {
                time: begin,
                duration: self.format.duration_for_bytes(range_end),
            });
        }
        Ok((range_begin, range_end))
    }
}

/// Image payload stored in one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMediaData {
    uid: String,
    provider: String,
}

impl ImageMediaData {
    pub(crate) fn new(uid: String, provider: String) -> Self {
        Self { uid, provider }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn mime_type<'a>(&self, providers: &'a DataProviderManager) -> Option<&'a str> {
        providers.get(&self.provider).map(|provider| provider.mime_type())
    }

    pub fn bytes(&self, providers: &DataProviderManager) -> MediaResult<Vec<u8>> {
        Ok(providers.read_all(&self.provider)?)
    }

    pub fn set_bytes(&self, providers: &DataProviderManager, bytes: &[u8]) -> MediaResult<()> {
        Ok(providers.write_all(&self.provider, bytes)?)
    }
}

/// Closed set of media data kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaData {
    Audio(WavAudioMediaData),
    Image(ImageMediaData),
}

impl MediaData {
    pub fn uid(&self) -> &str {
        match self {
            Self::Audio(data) => data.uid(),
            Self::Image(data) => data.uid(),
        }
    }

    pub fn local_name(&self) -> &'static str {
        match self {
            Self::Audio(_) => names::WAV_AUDIO_MEDIA_DATA,
            Self::Image(_) => names::IMAGE_MEDIA_DATA,
        }
    }

    /// Provider uids owned by this media data, without duplicates.
    pub fn provider_uids(&self) -> Vec<String> {
        match self {
            Self::Audio(data) => {
                let mut uids: Vec<String> = Vec::new();
                for clip in &data.clips {
                    if !uids.iter().any(|uid| uid == &clip.provider) {
                        uids.push(clip.provider.clone());
                    }
                }
                uids
            }
            Self::Image(data) => vec![data.provider.clone()],
        }
    }

    fn with_uid_and_providers(
        &self,
        uid: String,
        mut map_provider: impl FnMut(&str) -> MediaResult<String>,
    ) -> MediaResult<MediaData> {
        match self {
            Self::Audio(data) => {
                let mut mapped: HashMap<String, String> = HashMap::new();
                let mut copy = WavAudioMediaData::new(uid, data.format);
                for clip in &data.clips {
                    let provider = match mapped.get(&clip.provider) {
                        Some(existing) => existing.clone(),
                        None => {
                            let fresh = map_provider(&clip.provider)?;
                            mapped.insert(clip.provider.clone(), fresh.clone());
                            fresh
                        }
                    };
                    copy.clips
                        .push(WavClip::new(provider, clip.clip_begin, clip.clip_end));
                }
                Ok(MediaData::Audio(copy))
            }
            Self::Image(data) => Ok(MediaData::Image(ImageMediaData::new(
                uid,
                map_provider(&data.provider)?,
            ))),
        }
    }
}

/// Uid-keyed registry of media data for one Document.
#[derive(Debug, Clone, Default)]
pub struct MediaDataManager {
    items: BTreeMap<String, MediaData>,
    default_format: PcmFormat,
    enforce_single_pcm_format: bool,
}

impl MediaDataManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_pcm_format(&self) -> &PcmFormat {
        &self.default_format
    }

    /// Replaces the default PCM format used by `create_audio(None)`.
    ///
    /// With single-format enforcement on, every existing audio media data
    /// must already use `format`.
    pub fn set_default_pcm_format(&mut self, format: PcmFormat) -> MediaResult<()> {
        format.validate()?;
        if self.enforce_single_pcm_format {
            self.ensure_all_audio_use(&format)?;
        }
        self.default_format = format;
        Ok(())
    }

    pub fn enforce_single_pcm_format(&self) -> bool {
        self.enforce_single_pcm_format
    }

    pub fn set_enforce_single_pcm_format(&mut self, enforce: bool) -> MediaResult<()> {
        if enforce {
            let default_format = self.default_format;
            self.ensure_all_audio_use(&default_format)?;
        }
        self.enforce_single_pcm_format = enforce;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.items.contains_key(uid)
    }

    pub fn get(&self, uid: &str) -> Option<&MediaData> {
        self.items.get(uid)
    }

    pub fn uids(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaData> {
        self.items.values()
    }

    pub fn audio(&self, uid: &str) -> MediaResult<&WavAudioMediaData> {
        match self.items.get(uid) {
            Some(MediaData::Audio(data)) => Ok(data),
            Some(_) => Err(MediaError::WrongMediaDataKind {
                uid: uid.to_string(),
                expected: names::WAV_AUDIO_MEDIA_DATA,
            }),
            None => Err(MediaError::MediaDataNotFound(uid.to_string())),
        }
    }

    pub fn audio_mut(&mut self, uid: &str) -> MediaResult<&mut WavAudioMediaData> {
        match self.items.get_mut(uid) {
            Some(MediaData::Audio(data)) => Ok(data),
            Some(_) => Err(MediaError::WrongMediaDataKind {
                uid: uid.to_string(),
                expected: names::WAV_AUDIO_MEDIA_DATA,
            }),
            None => Err(MediaError::MediaDataNotFound(uid.to_string())),
        }
    }

    pub fn image(&self, uid: &str) -> MediaResult<&ImageMediaData> {
        match self.items.get(uid) {
            Some(MediaData::Image(data)) => Ok(data),
            Some(_) => Err(MediaError::WrongMediaDataKind {
                uid: uid.to_string(),
                expected: names::IMAGE_MEDIA_DATA,
            }),
            None => Err(MediaError::MediaDataNotFound(uid.to_string())),
        }
    }

    /// Creates empty audio media data; `None` uses the default format.
    pub fn create_audio(&mut self, format: Option<PcmFormat>) -> MediaResult<String> {
        let format = format.unwrap_or(self.default_format);
        format.validate()?;
        self.ensure_format_allowed(&format)?;
        let uid = self.fresh_uid();
        self.items.insert(
            uid.clone(),
            MediaData::Audio(WavAudioMediaData::new(uid.clone(), format)),
        );
        Ok(uid)
    }

    /// Creates image media data holding `bytes` in a fresh provider.
    pub fn create_image(
        &mut self,
        providers: &mut DataProviderManager,
        mime_type: &str,
        bytes: &[u8],
    ) -> MediaResult<String> {
        let normalized = mime_type.trim().to_ascii_lowercase();
        if !normalized.starts_with("image/") {
            return Err(MediaError::InvalidMimeType(mime_type.to_string()));
        }
        let provider = providers.create(&normalized)?;
        if let Err(err) = providers.write_all(&provider, bytes) {
            let _ = providers.delete(&provider);
            return Err(err.into());
        }
        let uid = self.fresh_uid();
        self.items.insert(
            uid.clone(),
            MediaData::Image(ImageMediaData::new(uid.clone(), provider)),
        );
        Ok(uid)
    }

    /// Registers media data read from a document.
    pub(crate) fn insert(&mut self, media_data: MediaData) -> MediaResult<()> {
        let uid = media_data.uid().to_string();
        if self.items.contains_key(&uid) {
            return Err(MediaError::DuplicateUid(uid));
        }
        if let MediaData::Audio(audio) = &media_data {
            self.ensure_format_allowed(&audio.format)?;
        }
        self.items.insert(uid, media_data);
        Ok(())
    }

    /// Deregisters media data. Its providers are left for garbage collection.
    pub fn remove(&mut self, uid: &str) -> Option<MediaData> {
        self.items.remove(uid)
    }

    /// Deep-copies media data within this manager, duplicating its providers.
    pub fn copy(&mut self, uid: &str, providers: &mut DataProviderManager) -> MediaResult<String> {
        let source = self
            .items
            .get(uid)
            .cloned()
            .ok_or_else(|| MediaError::MediaDataNotFound(uid.to_string()))?;
        let new_uid = self.fresh_uid();
        let copy = source.with_uid_and_providers(new_uid.clone(), |provider| {
            Ok(providers.duplicate(provider)?)
        })?;
        self.items.insert(new_uid.clone(), copy);
        Ok(new_uid)
    }

    /// Copies media data and its providers into another Document's managers.
    pub fn export(
        &self,
        uid: &str,
        providers: &DataProviderManager,
        dest: &mut MediaDataManager,
        dest_providers: &mut DataProviderManager,
    ) -> MediaResult<String> {
        let source = self
            .items
            .get(uid)
            .ok_or_else(|| MediaError::MediaDataNotFound(uid.to_string()))?;
        if let MediaData::Audio(audio) = source {
            dest.ensure_format_allowed(&audio.format)?;
        }
        let new_uid = dest.fresh_uid();
        let copy = source.with_uid_and_providers(new_uid.clone(), |provider| {
            Ok(providers.copy_into(provider, dest_providers)?)
        })?;
        dest.items.insert(new_uid.clone(), copy);
        Ok(new_uid)
    }

    /// Content equality of two media data, possibly in different Documents.
    pub fn value_eq(
        &self,
        uid: &str,
        providers: &DataProviderManager,
        other: &MediaDataManager,
        other_providers: &DataProviderManager,
        other_uid: &str,
    ) -> MediaResult<bool> {
        let left = self
            .items
            .get(uid)
            .ok_or_else(|| MediaError::MediaDataNotFound(uid.to_string()))?;
        let right = other
            .items
            .get(other_uid)
            .ok_or_else(|| MediaError::MediaDataNotFound(other_uid.to_string()))?;
        match (left, right) {
            (MediaData::Audio(left), MediaData::Audio(right)) => {
                if left.format != right.format {
                    return Ok(false);
                }
                let left_pcm = left.read_pcm(providers, Time::ZERO, None)?;
                let right_pcm = right.read_pcm(other_providers, Time::ZERO, None)?;
                Ok(left_pcm == right_pcm)
            }
            (MediaData::Image(left), MediaData::Image(right)) => {
                if left.mime_type(providers) != right.mime_type(other_providers) {
                    return Ok(false);
                }
                Ok(providers.content_eq(&left.provider, other_providers, &right.provider)?)
            }
            _ => Ok(false),
        }
    }

    /// Union of provider uids owned by registered media data.
    pub fn referenced_provider_uids(&self) -> HashSet<String> {
        self.items
            .values()
            .flat_map(MediaData::provider_uids)
            .collect()
    }

    pub(crate) fn ensure_format_allowed(&self, format: &PcmFormat) -> MediaResult<()> {
        if self.enforce_single_pcm_format && *format != self.default_format {
            return Err(MediaError::PcmFormatMismatch {
                expected: self.default_format,
                actual: *format,
            });
        }
        Ok(())
    }

    fn ensure_all_audio_use(&self, format: &PcmFormat) -> MediaResult<()> {
        for item in self.items.values() {
            if let MediaData::Audio(audio) = item {
                if audio.format != *format {
                    return Err(MediaError::PcmFormatMismatch {
                        expected: *format,
                        actual: audio.format,
                    });
                }
            }
        }
        Ok(())
    }

    fn fresh_uid(&self) -> String {
        loop {
            let uid = format!("MD{}", Uuid::new_v4().simple());
            if !self.items.contains_key(&uid) {
                return uid;
            }
        }
    }
}

fn write_wav_provider(
    providers: &mut DataProviderManager,
    format: &PcmFormat,
    pcm: &[u8],
) -> MediaResult<String> {
    let uid = providers.create(WAV_MIME_TYPE)?;
    let written = (|| -> MediaResult<()> {
        let mut writer = providers.open_write(&uid)?;
        WavHeader::write(format, pcm.len() as u64, &mut writer)?;
        std::io::Write::write_all(&mut writer, pcm)?;
        writer.finish()?;
        Ok(())
    })();
    if let Err(err) = written {
        let _ = providers.delete(&uid);
        return Err(err);
    }
    Ok(uid)
}
