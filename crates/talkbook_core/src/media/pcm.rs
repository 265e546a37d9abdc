//! PCM format description and byte-accurate time conversion.
//!
//! # Invariants
//! - `Time` is an integer count of 100 ns ticks.
//! - For any byte count aligned to `block_align()`,
//!   `bytes_for_duration(duration_for_bytes(n)) == n`.

use super::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

const TICKS_PER_SECOND: i64 = 10_000_000;
const TICKS_PER_MILLISECOND: i64 = 10_000;
const SUPPORTED_BIT_DEPTHS: &[u16] = &[8, 16, 24, 32];

/// Media time position or duration in 100 ns ticks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    pub const ZERO: Time = Time(0);

    pub fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(TICKS_PER_MILLISECOND))
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * TICKS_PER_SECOND as f64).round() as i64)
    }

    pub fn ticks(self) -> i64 {
        self.0
    }

    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_MILLISECOND as f64
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        Time(self.0.saturating_sub(rhs.0))
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}ms", self.as_millis_f64())
    }
}

/// Raw audio payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 44_100,
            bit_depth: 16,
        }
    }
}

impl PcmFormat {
    pub fn new(channels: u16, sample_rate: u32, bit_depth: u16) -> MediaResult<Self> {
        let format = Self {
            channels,
            sample_rate,
            bit_depth,
        };
        format.validate()?;
        Ok(format)
    }

    /// Checks channel count, sample rate and bit depth.
    pub fn validate(&self) -> MediaResult<()> {
        if self.channels == 0 {
            return Err(MediaError::InvalidPcmFormat(
                "channel count must be at least 1".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(MediaError::InvalidPcmFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&self.bit_depth) {
            return Err(MediaError::InvalidPcmFormat(format!(
                "unsupported bit depth {}; expected 8|16|24|32",
                self.bit_depth
            )));
        }
        Ok(())
    }

    /// Bytes per sample frame across all channels.
    pub fn block_align(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.bit_depth / 8)
    }

    pub fn byte_rate(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.block_align())
    }

    pub fn is_block_aligned(&self, bytes: u64) -> bool {
        let block = u64::from(self.block_align());
        block != 0 && bytes % block == 0
    }

    /// Rounds a byte count down to whole sample frames.
    pub fn align_down(&self, bytes: u64) -> u64 {
        let block = u64::from(self.block_align()).max(1);
        bytes - bytes % block
    }

    /// Duration of `bytes` of PCM data, rounded to the nearest tick.
    pub fn duration_for_bytes(&self, bytes: u64) -> Time {
        let byte_rate = u128::from(self.byte_rate()).max(1);
        let ticks = (u128::from(bytes) * TICKS_PER_SECOND as u128 + byte_rate / 2) / byte_rate;
        Time(ticks.min(i64::MAX as u128) as i64)
    }

    /// Byte count for `duration`, rounded to the nearest whole sample frame.
    ///
    /// Negative durations map to zero.
    pub fn bytes_for_duration(&self, duration: Time) -> u64 {
        if duration.0 <= 0 {
            return 0;
        }
        let per_second = TICKS_PER_SECOND as u128;
        let frames = (duration.0 as u128 * u128::from(self.sample_rate) + per_second / 2) / per_second;
        (frames * u128::from(self.block_align())).min(u64::MAX as u128) as u64
    }
}

impl Display for PcmFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}ch/{}Hz/{}bit",
            self.channels, self.sample_rate, self.bit_depth
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{PcmFormat, Time};

    fn representative_formats() -> Vec<PcmFormat> {
        let mut formats = Vec::new();
        for channels in [1_u16, 2, 6] {
            for sample_rate in [8_000_u32, 11_025, 22_050, 44_100, 48_000, 96_000, 192_000] {
                for bit_depth in [8_u16, 16, 24, 32] {
                    formats.push(PcmFormat::new(channels, sample_rate, bit_depth).unwrap());
                }
            }
        }
        formats
    }

    #[test]
    fn bytes_and_duration_are_inverse_for_aligned_counts() {
        for format in representative_formats() {
            let block = u64::from(format.block_align());
            let max_blocks = (u64::from(u32::MAX)) / block;
            let mut samples = vec![0_u64, 1, 2, 3, max_blocks, max_blocks - 1];
            let mut k = 7_u64;
            while k < max_blocks {
                samples.push(k);
                k = k * 3 + 11;
            }
            for blocks in samples {
                let bytes = blocks * block;
                let duration = format.duration_for_bytes(bytes);
                assert_eq!(
                    format.bytes_for_duration(duration),
                    bytes,
                    "format {format} bytes {bytes}"
                );
            }
        }
    }

    #[test]
    fn one_second_of_cd_audio() {
        let format = PcmFormat::new(2, 44_100, 16).unwrap();
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.byte_rate(), 176_400);
        assert_eq!(format.duration_for_bytes(176_400), Time::from_millis(1_000));
        assert_eq!(format.bytes_for_duration(Time::from_millis(500)), 88_200);
    }

    #[test]
    fn bytes_for_duration_rounds_to_whole_frames() {
        let format = PcmFormat::new(2, 44_100, 16).unwrap();
        let bytes = format.bytes_for_duration(Time::from_ticks(1));
        assert!(format.is_block_aligned(bytes));
        assert_eq!(format.bytes_for_duration(Time::from_ticks(-5)), 0);
    }

    #[test]
    fn validate_rejects_bad_formats() {
        assert!(PcmFormat::new(0, 44_100, 16).is_err());
        assert!(PcmFormat::new(1, 0, 16).is_err());
        assert!(PcmFormat::new(1, 44_100, 12).is_err());
    }

    #[test]
    fn time_helpers() {
        assert_eq!(Time::from_millis(2).ticks(), 20_000);
        assert_eq!(Time::from_millis(3) - Time::from_millis(1), Time::from_millis(2));
        assert_eq!(Time::from_secs_f64(0.5), Time::from_millis(500));
    }
}
