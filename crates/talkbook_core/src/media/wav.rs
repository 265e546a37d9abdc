//! RIFF/WAVE header parsing and canonical header writing.

use super::pcm::PcmFormat;
use super::{MediaError, MediaResult};
use std::io::{Read, Write};

/// Size of the canonical header written by [`WavHeader::write`].
pub const CANONICAL_HEADER_LEN: u64 = 44;

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
/// Largest `fmt ` prefix kept in memory; WAVE_FORMAT_EXTENSIBLE needs 40.
const FMT_CHUNK_KEPT: u64 = 64;

/// Parsed RIFF/WAVE header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format: PcmFormat,
    /// Length of the `data` chunk payload in bytes.
    pub data_len: u64,
    /// Byte offset of the first PCM byte from the start of the file.
    pub data_offset: u64,
}

impl WavHeader {
    /// Parses a RIFF/WAVE header, leaving `reader` positioned at the first PCM byte.
    ///
    /// # Errors
    /// - `InvalidWavHeader` for a missing RIFF/WAVE signature, missing or
    ///   non-PCM `fmt ` chunk, missing `data` chunk, or inconsistent fields.
    pub fn parse(reader: &mut impl Read) -> MediaResult<Self> {
        let mut riff = [0_u8; 12];
        read_header_bytes(reader, &mut riff)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(MediaError::InvalidWavHeader(
                "missing RIFF/WAVE signature".to_string(),
            ));
        }

        let mut offset = 12_u64;
        let mut format: Option<PcmFormat> = None;
        loop {
            let mut chunk = [0_u8; 8];
            read_header_bytes(reader, &mut chunk)?;
            offset += 8;
            let chunk_len = u64::from(u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]));

            match &chunk[0..4] {
                b"fmt " => {
                    if chunk_len < 16 {
                        return Err(MediaError::InvalidWavHeader(format!(
                            "fmt chunk too short: {chunk_len} bytes"
                        )));
                    }
                    let kept = chunk_len.min(FMT_CHUNK_KEPT);
                    let mut body = vec![0_u8; kept as usize];
                    read_header_bytes(reader, &mut body)?;
                    let rest = chunk_len - kept + chunk_len % 2;
                    skip(reader, rest)?;
                    offset += kept + rest;
                    format = Some(parse_fmt_chunk(&body)?);
                }
                b"data" => {
                    let format = format.ok_or_else(|| {
                        MediaError::InvalidWavHeader("data chunk before fmt chunk".to_string())
                    })?;
                    if !format.is_block_aligned(chunk_len) {
                        return Err(MediaError::InvalidWavHeader(format!(
                            "data length {chunk_len} is not aligned to block size {}",
                            format.block_align()
                        )));
                    }
                    return Ok(Self {
                        format,
                        data_len: chunk_len,
                        data_offset: offset,
                    });
                }
                _ => {
                    let padded = chunk_len + chunk_len % 2;
                    skip(reader, padded)?;
                    offset += padded;
                }
            }
        }
    }

    /// Writes the canonical 44-byte PCM header for `data_len` payload bytes.
    pub fn write(format: &PcmFormat, data_len: u64, writer: &mut impl Write) -> MediaResult<()> {
        format.validate()?;
        let data_len = u32::try_from(data_len).map_err(|_| {
            MediaError::InvalidWavHeader(format!("data length {data_len} exceeds RIFF limit"))
        })?;
        let riff_len = data_len.checked_add(36).ok_or_else(|| {
            MediaError::InvalidWavHeader(format!("data length {data_len} exceeds RIFF limit"))
        })?;
        let byte_rate = u32::try_from(format.byte_rate()).map_err(|_| {
            MediaError::InvalidPcmFormat(format!("byte rate of {format} exceeds RIFF limit"))
        })?;
        let block_align = u16::try_from(format.block_align()).map_err(|_| {
            MediaError::InvalidPcmFormat(format!("block align of {format} exceeds RIFF limit"))
        })?;

        let mut header = Vec::with_capacity(CANONICAL_HEADER_LEN as usize);
        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&riff_len.to_le_bytes());
        header.extend_from_slice(b"WAVE");
        header.extend_from_slice(b"fmt ");
        header.extend_from_slice(&16_u32.to_le_bytes());
        header.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        header.extend_from_slice(&format.channels.to_le_bytes());
        header.extend_from_slice(&format.sample_rate.to_le_bytes());
        header.extend_from_slice(&byte_rate.to_le_bytes());
        header.extend_from_slice(&block_align.to_le_bytes());
        header.extend_from_slice(&format.bit_depth.to_le_bytes());
        header.extend_from_slice(b"data");
        header.extend_from_slice(&data_len.to_le_bytes());
        writer.write_all(&header)?;
        Ok(())
    }
}

fn parse_fmt_chunk(body: &[u8]) -> MediaResult<PcmFormat> {
    let audio_format = u16::from_le_bytes([body[0], body[1]]);
    if audio_format != WAVE_FORMAT_PCM && audio_format != WAVE_FORMAT_EXTENSIBLE {
        return Err(MediaError::InvalidWavHeader(format!(
            "unsupported audio format tag {audio_format}; only PCM is supported"
        )));
    }
    let channels = u16::from_le_bytes([body[2], body[3]]);
    let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    let byte_rate = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
    let block_align = u16::from_le_bytes([body[12], body[13]]);
    let bit_depth = u16::from_le_bytes([body[14], body[15]]);

    let format = PcmFormat {
        channels,
        sample_rate,
        bit_depth,
    };
    format
        .validate()
        .map_err(|err| MediaError::InvalidWavHeader(err.to_string()))?;
    if u32::from(block_align) != format.block_align() || u64::from(byte_rate) != format.byte_rate()
    {
        return Err(MediaError::InvalidWavHeader(format!(
            "inconsistent fmt chunk: block_align={block_align} byte_rate={byte_rate} for {format}"
        )));
    }
    Ok(format)
}

fn read_header_bytes(reader: &mut impl Read, buf: &mut [u8]) -> MediaResult<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            MediaError::InvalidWavHeader("truncated header".to_string())
        } else {
            MediaError::Io(err)
        }
    })
}

fn skip(reader: &mut impl Read, len: u64) -> MediaResult<()> {
    let skipped = std::io::copy(&mut reader.take(len), &mut std::io::sink())?;
    if skipped != len {
        return Err(MediaError::InvalidWavHeader("truncated chunk".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{WavHeader, CANONICAL_HEADER_LEN};
    use crate::media::pcm::PcmFormat;
    use crate::media::MediaError;
    use std::io::Cursor;

    #[test]
    fn canonical_header_parses_back() {
        let format = PcmFormat::new(2, 22_050, 16).unwrap();
        let mut bytes = Vec::new();
        WavHeader::write(&format, 8, &mut bytes).unwrap();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(bytes.len() as u64, CANONICAL_HEADER_LEN + 8);

        let header = WavHeader::parse(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.format, format);
        assert_eq!(header.data_len, 8);
        assert_eq!(header.data_offset, CANONICAL_HEADER_LEN);
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let format = PcmFormat::new(1, 8_000, 8).unwrap();
        let mut canonical = Vec::new();
        WavHeader::write(&format, 2, &mut canonical).unwrap();

        let mut bytes = canonical[..36].to_vec();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3_u32.to_le_bytes());
        bytes.extend_from_slice(&[9, 9, 9, 0]);
        bytes.extend_from_slice(&canonical[36..]);
        bytes.extend_from_slice(&[7, 7]);

        let header = WavHeader::parse(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.data_offset, CANONICAL_HEADER_LEN + 12);
        assert_eq!(header.data_len, 2);
    }

    #[test]
    fn rejects_garbage_and_truncation() {
        let err = WavHeader::parse(&mut Cursor::new(b"not a wave file at all".to_vec()))
            .expect_err("garbage must be rejected");
        assert!(matches!(err, MediaError::InvalidWavHeader(_)));

        let err = WavHeader::parse(&mut Cursor::new(b"RIFF".to_vec()))
            .expect_err("truncated header must be rejected");
        assert!(matches!(err, MediaError::InvalidWavHeader(_)));
    }

    #[test]
    fn oversized_fmt_length_reports_truncation() {
        let format = PcmFormat::new(1, 8_000, 8).unwrap();
        let mut bytes = Vec::new();
        WavHeader::write(&format, 0, &mut bytes).unwrap();
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());

        let err = WavHeader::parse(&mut Cursor::new(&bytes))
            .expect_err("a fmt chunk longer than the file must be rejected");
        assert!(matches!(err, MediaError::InvalidWavHeader(_)));
    }

    #[test]
    fn block_align_beyond_u16_is_refused() {
        let format = PcmFormat::new(u16::MAX, 8_000, 32).unwrap();
        let err = WavHeader::write(&format, 0, &mut Vec::new())
            .expect_err("block align must fit the fmt field");
        assert!(matches!(err, MediaError::InvalidPcmFormat(_)));
    }
}
