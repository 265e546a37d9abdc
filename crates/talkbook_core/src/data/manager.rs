//! Data provider registry bound to one data directory.
//!
//! # Responsibility
//! - Allocate unique provider uids and map them to backing files.
//! - Open scoped streams and delete providers under stream discipline.
//!
//! # Invariants
//! - Every registered provider's file lives under `data_dir`.
//! - `create` materializes an empty backing file, so a registered provider
//!   always has a file unless it was removed behind the manager's back.

use super::provider::{DataProvider, ProviderReader, ProviderWriter};
use super::{DataError, DataResult};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

static MIME_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9!#$&^_.+-]*/[a-z0-9][a-z0-9!#$&^_.+-]*$")
        .expect("mime type pattern is valid")
});

const COMPARE_CHUNK_BYTES: usize = 64 * 1024;

/// Uid-keyed registry of file-backed data providers.
#[derive(Debug)]
pub struct DataProviderManager {
    data_dir: PathBuf,
    providers: BTreeMap<String, DataProvider>,
}

impl DataProviderManager {
    /// Creates an empty manager rooted at `data_dir`.
    ///
    /// The directory is created lazily on first provider creation.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            providers: BTreeMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.providers.contains_key(uid)
    }

    pub fn get(&self, uid: &str) -> Option<&DataProvider> {
        self.providers.get(uid)
    }

    /// Returns registered uids in sorted order.
    pub fn uids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataProvider> {
        self.providers.values()
    }

    /// Creates a new provider with a fresh uid and an empty backing file.
    ///
    /// # Errors
    /// - `InvalidMimeType` when `mime_type` is not `type/subtype`.
    /// - `Io` when the data directory or file cannot be created.
    pub fn create(&mut self, mime_type: &str) -> DataResult<String> {
        let mime_type = normalize_mime_type(mime_type)?;
        let mut uid = new_uid();
        while self.providers.contains_key(&uid) {
            uid = new_uid();
        }
        let file_name = format!("{uid}.{}", extension_for_mime(&mime_type));

        std::fs::create_dir_all(&self.data_dir)?;
        let provider = DataProvider::new(uid.clone(), mime_type, file_name, &self.data_dir);
        std::fs::File::create(provider.path())?;
        debug!(
            "event=provider_create module=data status=ok uid={} mime={}",
            uid,
            provider.mime_type()
        );
        self.providers.insert(uid.clone(), provider);
        Ok(uid)
    }

    /// Registers a provider whose backing file already exists.
    ///
    /// Used by the document reader; the file must be present.
    pub fn register_existing(
        &mut self,
        uid: &str,
        mime_type: &str,
        file_name: &str,
    ) -> DataResult<()> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(DataError::ProviderNotFound(uid.to_string()));
        }
        if self.providers.contains_key(uid) {
            return Err(DataError::DuplicateUid(uid.to_string()));
        }
        let mime_type = normalize_mime_type(mime_type)?;
        validate_file_name(file_name)?;

        let provider = DataProvider::new(
            uid.to_string(),
            mime_type,
            file_name.to_string(),
            &self.data_dir,
        );
        if !provider.path().is_file() {
            return Err(DataError::MissingFile {
                uid: uid.to_string(),
                path: provider.path().to_path_buf(),
            });
        }
        self.providers.insert(uid.to_string(), provider);
        Ok(())
    }

    /// Opens one read stream. Any number of readers may coexist.
    pub fn open_read(&self, uid: &str) -> DataResult<ProviderReader> {
        self.require(uid)?.open_read()
    }

    /// Opens the single write stream, truncating existing content.
    pub fn open_write(&self, uid: &str) -> DataResult<ProviderWriter> {
        self.require(uid)?.open_write(false)
    }

    /// Opens the single write stream positioned at the end of content.
    pub fn open_append(&self, uid: &str) -> DataResult<ProviderWriter> {
        self.require(uid)?.open_write(true)
    }

    /// Replaces provider content with `bytes`.
    pub fn write_all(&self, uid: &str, bytes: &[u8]) -> DataResult<()> {
        let mut writer = self.open_write(uid)?;
        writer.write_all(bytes)?;
        writer.finish()
    }

    /// Appends `bytes` to provider content.
    pub fn append(&self, uid: &str, bytes: &[u8]) -> DataResult<()> {
        let mut writer = self.open_append(uid)?;
        writer.write_all(bytes)?;
        writer.finish()
    }

    /// Reads the full provider content.
    pub fn read_all(&self, uid: &str) -> DataResult<Vec<u8>> {
        let mut reader = self.open_read(uid)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Length of provider content in bytes.
    pub fn len_bytes(&self, uid: &str) -> DataResult<u64> {
        let provider = self.require(uid)?;
        match std::fs::metadata(provider.path()) {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(DataError::MissingFile {
                uid: uid.to_string(),
                path: provider.path().to_path_buf(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes one provider: deregisters it and removes its backing file.
    ///
    /// # Errors
    /// - `StreamsOpen` when any stream is open; the provider stays registered.
    pub fn delete(&mut self, uid: &str) -> DataResult<()> {
        self.require(uid)?.ensure_closed()?;
        let provider = self
            .providers
            .remove(uid)
            .ok_or_else(|| DataError::ProviderNotFound(uid.to_string()))?;
        match std::fs::remove_file(provider.path()) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                self.providers.insert(uid.to_string(), provider);
                return Err(err.into());
            }
        }
        debug!("event=provider_delete module=data status=ok uid={uid}");
        Ok(())
    }

    /// Byte-for-byte comparison of two providers, possibly in different managers.
    ///
    /// MIME types are not compared.
    pub fn content_eq(
        &self,
        uid: &str,
        other: &DataProviderManager,
        other_uid: &str,
    ) -> DataResult<bool> {
        let mut left = self.open_read(uid)?;
        let mut right = other.open_read(other_uid)?;
        if left.len()? != right.len()? {
            return Ok(false);
        }

        let mut left_buf = vec![0_u8; COMPARE_CHUNK_BYTES];
        let mut right_buf = vec![0_u8; COMPARE_CHUNK_BYTES];
        loop {
            let read = read_full(&mut left, &mut left_buf)?;
            let other_read = read_full(&mut right, &mut right_buf)?;
            if read != other_read || left_buf[..read] != right_buf[..other_read] {
                return Ok(false);
            }
            if read == 0 {
                return Ok(true);
            }
        }
    }

    /// Copies one provider into another manager under a fresh uid.
    pub fn copy_into(&self, uid: &str, dest: &mut DataProviderManager) -> DataResult<String> {
        let mime_type = self.require(uid)?.mime_type().to_string();
        let mut reader = self.open_read(uid)?;
        let new_uid = dest.create(&mime_type)?;
        let mut writer = dest.open_write(&new_uid)?;
        std::io::copy(&mut reader, &mut writer)?;
        writer.finish()?;
        Ok(new_uid)
    }

    /// Copies one provider within this manager under a fresh uid.
    pub fn duplicate(&mut self, uid: &str) -> DataResult<String> {
        let mime_type = self.require(uid)?.mime_type().to_string();
        let mut reader = self.open_read(uid)?;
        let new_uid = self.create(&mime_type)?;
        let mut writer = self.open_write(&new_uid)?;
        std::io::copy(&mut reader, &mut writer)?;
        writer.finish()?;
        Ok(new_uid)
    }

    /// Deletes every provider whose uid is not in `referenced`.
    ///
    /// Providers with open streams are left untouched and reported as errors.
    pub fn remove_unreferenced(&mut self, referenced: &HashSet<String>) -> DataResult<Vec<String>> {
        let doomed: Vec<String> = self
            .providers
            .keys()
            .filter(|uid| !referenced.contains(*uid))
            .cloned()
            .collect();
        for uid in &doomed {
            self.require(uid)?.ensure_closed()?;
        }
        for uid in &doomed {
            self.delete(uid)?;
        }
        if !doomed.is_empty() {
            info!(
                "event=provider_sweep module=data status=ok removed={}",
                doomed.len()
            );
        }
        Ok(doomed)
    }

    fn require(&self, uid: &str) -> DataResult<&DataProvider> {
        self.providers
            .get(uid)
            .ok_or_else(|| DataError::ProviderNotFound(uid.to_string()))
    }
}

fn new_uid() -> String {
    format!("DP{}", Uuid::new_v4().simple())
}

fn normalize_mime_type(value: &str) -> DataResult<String> {
    let normalized = value.trim().to_ascii_lowercase();
    if !MIME_TYPE_RE.is_match(&normalized) {
        return Err(DataError::InvalidMimeType(value.to_string()));
    }
    Ok(normalized)
}

fn validate_file_name(value: &str) -> DataResult<()> {
    let path = Path::new(value);
    let plain = !value.trim().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !plain {
        return Err(DataError::InvalidFileName(value.to_string()));
    }
    Ok(())
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/x-wav" | "audio/wav" | "audio/wave" => "wav",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/bmp" => "bmp",
        "image/gif" => "gif",
        "text/plain" => "txt",
        _ => "bin",
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::{extension_for_mime, normalize_mime_type, validate_file_name};

    #[test]
    fn normalize_mime_type_lowercases_and_rejects_garbage() {
        assert_eq!(
            normalize_mime_type(" Audio/X-WAV ").expect("mime should normalize"),
            "audio/x-wav"
        );
        assert!(normalize_mime_type("audio").is_err());
        assert!(normalize_mime_type("").is_err());
    }

    #[test]
    fn file_names_must_stay_inside_data_dir() {
        assert!(validate_file_name("abc.wav").is_ok());
        assert!(validate_file_name("../abc.wav").is_err());
        assert!(validate_file_name("/tmp/abc.wav").is_err());
        assert!(validate_file_name("  ").is_err());
    }

    #[test]
    fn extension_follows_mime_type() {
        assert_eq!(extension_for_mime("audio/x-wav"), "wav");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("application/x-custom"), "bin");
    }
}
