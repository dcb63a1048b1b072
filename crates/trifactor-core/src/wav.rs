//! RIFF/WAVE container for voice samples.
//!
//! Voice references and probes cross the engine boundary as
//! single-channel, 16 kHz, 16-bit PCM wrapped in the canonical 44-byte
//! header: `RIFF` / `WAVE` / `fmt ` (sub-chunk size 16, format tag 1 = PCM)
//! / `data`. The layout is bit-exact — downstream voice models parse it
//! byte-for-byte.

use thiserror::Error;

/// Canonical header length: 12-byte RIFF preamble, 24-byte fmt chunk,
/// 8-byte data chunk header.
pub const HEADER_LEN: usize = 44;

/// fmt sub-chunk payload size for plain PCM.
const FMT_CHUNK_LEN: u32 = 16;
/// Audio format tag for uncompressed PCM.
const FORMAT_PCM: u16 = 1;

#[derive(Debug, Error, PartialEq)]
pub enum WavError {
    #[error("payload of {0} bytes does not fit a RIFF container")]
    PayloadTooLarge(usize),
    #[error("container truncated: {0} bytes, need at least {HEADER_LEN}")]
    Truncated(usize),
    #[error("missing {0} tag")]
    MissingTag(&'static str),
    #[error("unexpected fmt sub-chunk size {0} (PCM requires {FMT_CHUNK_LEN})")]
    BadFmtChunk(u32),
    #[error("unsupported audio format tag {0} (only PCM = {FORMAT_PCM})")]
    NotPcm(u16),
    #[error("declared data length {declared} exceeds available {available} bytes")]
    DataOverrun { declared: usize, available: usize },
}

/// PCM stream parameters carried by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate_hz: u32,
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// The engine's voice capture format: mono, 16 kHz, 16-bit.
    pub fn voice() -> Self {
        Self {
            channels: 1,
            sample_rate_hz: 16_000,
            bits_per_sample: 16,
        }
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate_hz * u32::from(self.channels) * u32::from(self.bits_per_sample) / 8
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }
}

/// Wrap raw PCM bytes in a canonical 44-byte WAV header.
pub fn write_wav(pcm: &[u8], spec: WavSpec) -> Result<Vec<u8>, WavError> {
    let data_len =
        u32::try_from(pcm.len()).map_err(|_| WavError::PayloadTooLarge(pcm.len()))?;
    let chunk_size = data_len
        .checked_add(HEADER_LEN as u32 - 8)
        .ok_or(WavError::PayloadTooLarge(pcm.len()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&chunk_size.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&spec.channels.to_le_bytes());
    out.extend_from_slice(&spec.sample_rate_hz.to_le_bytes());
    out.extend_from_slice(&spec.byte_rate().to_le_bytes());
    out.extend_from_slice(&spec.block_align().to_le_bytes());
    out.extend_from_slice(&spec.bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    Ok(out)
}

/// Parse a canonical header, returning the stream parameters and the PCM
/// payload slice.
pub fn read_wav(bytes: &[u8]) -> Result<(WavSpec, &[u8]), WavError> {
    if bytes.len() < HEADER_LEN {
        return Err(WavError::Truncated(bytes.len()));
    }
    if &bytes[0..4] != b"RIFF" {
        return Err(WavError::MissingTag("RIFF"));
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(WavError::MissingTag("WAVE"));
    }
    if &bytes[12..16] != b"fmt " {
        return Err(WavError::MissingTag("fmt "));
    }
    let fmt_len = u32_at(bytes, 16);
    if fmt_len != FMT_CHUNK_LEN {
        return Err(WavError::BadFmtChunk(fmt_len));
    }
    let format = u16_at(bytes, 20);
    if format != FORMAT_PCM {
        return Err(WavError::NotPcm(format));
    }
    if &bytes[36..40] != b"data" {
        return Err(WavError::MissingTag("data"));
    }

    let spec = WavSpec {
        channels: u16_at(bytes, 22),
        sample_rate_hz: u32_at(bytes, 24),
        bits_per_sample: u16_at(bytes, 34),
    };

    let declared = u32_at(bytes, 40) as usize;
    let available = bytes.len() - HEADER_LEN;
    if declared > available {
        return Err(WavError::DataOverrun {
            declared,
            available,
        });
    }

    Ok((spec, &bytes[HEADER_LEN..HEADER_LEN + declared]))
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
