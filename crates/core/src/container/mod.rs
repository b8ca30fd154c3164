//! Reader and writer for the Bitwave container.
//!
//! Layout (little-endian):
//!
//! ```text
//! magic[3] version:u8 flags:u32 sample_rate:u32 channels:u8 duration:f32
//! [bpm:f32]                          flags & 0x01
//! interleaved f32 frames
//! [channels x (x, y, z) f32]         flags & 0x02, trailing
//! ```
//!
//! Spatial coordinates use the same 32-bit float width as samples.

use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::{AudioBuffer, BitwaveError, Result};

/// Literal at offset 0 of every Bitwave file.
pub const MAGIC: &[u8; 3] = b"BWX";
/// Format version written by this crate.
pub const VERSION: u8 = 1;

/// Size of the fixed header, excluding the optional BPM field.
pub const HEADER_LEN: usize = 17;
const VALUE_WIDTH: usize = std::mem::size_of::<f32>();
const SPATIAL_STRIDE: usize = 3 * VALUE_WIDTH;

/// Header flag bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(pub u32);

impl Flags {
    pub const BPM: u32 = 0x01;
    pub const SPATIAL: u32 = 0x02;
    const KNOWN: u32 = Self::BPM | Self::SPATIAL;

    pub fn has_bpm(self) -> bool {
        self.0 & Self::BPM != 0
    }

    pub fn has_spatial(self) -> bool {
        self.0 & Self::SPATIAL != 0
    }

    /// Bits this version does not interpret.
    pub fn reserved(self) -> u32 {
        self.0 & !Self::KNOWN
    }
}

/// Fixed-size record at the start of the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub version: u8,
    pub flags: Flags,
    pub sample_rate: u32,
    pub channels: u8,
    /// Advisory only. The payload length decides the frame count.
    pub duration_seconds: f32,
    pub bpm: Option<f32>,
}

impl Header {
    pub fn is_supported_version(&self) -> bool {
        self.version == VERSION
    }
}

/// Static placement of one channel's virtual source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl SpatialPosition {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Optional data carried alongside the samples.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub bpm: Option<f32>,
    /// One position per channel when present.
    pub spatial: Option<Vec<SpatialPosition>>,
    /// Flag bits outside the known set, written back unchanged.
    #[serde(default)]
    pub reserved_flags: u32,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bpm(mut self, bpm: f32) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn with_spatial(mut self, positions: Vec<SpatialPosition>) -> Self {
        self.spatial = Some(positions);
        self
    }

    /// Flags implied by the fields that are present.
    pub fn flags(&self) -> Flags {
        let mut bits = self.reserved_flags & !Flags::KNOWN;
        if self.bpm.is_some() {
            bits |= Flags::BPM;
        }
        if self.spatial.is_some() {
            bits |= Flags::SPATIAL;
        }
        Flags(bits)
    }
}

/// Everything recovered from a Bitwave byte stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub header: Header,
    pub metadata: Metadata,
    pub buffer: AudioBuffer,
}

/// Parses a complete Bitwave file held in memory.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
    let prefix = &bytes[..bytes.len().min(MAGIC.len())];
    if prefix != &MAGIC[..prefix.len()] {
        return Err(BitwaveError::Format("missing BWX magic".into()));
    }
    require(bytes, HEADER_LEN, "header")?;

    let mut cursor = Cursor::new(bytes);
    cursor.set_position(MAGIC.len() as u64);
    let version = cursor.read_u8()?;
    let flags = Flags(cursor.read_u32::<LittleEndian>()?);
    let sample_rate = cursor.read_u32::<LittleEndian>()?;
    let channels = cursor.read_u8()?;
    let duration_seconds = cursor.read_f32::<LittleEndian>()?;

    if sample_rate == 0 {
        return Err(BitwaveError::Format("sample rate must be non-zero".into()));
    }
    if channels == 0 {
        return Err(BitwaveError::Format("channel count must be at least one".into()));
    }
    if version != VERSION {
        tracing::warn!(
            version,
            expected = VERSION,
            "unknown bitwave version, reading base layout"
        );
    }

    let bpm = if flags.has_bpm() {
        require(bytes, HEADER_LEN + VALUE_WIDTH, "bpm")?;
        Some(cursor.read_f32::<LittleEndian>()?)
    } else {
        None
    };

    let payload_start = cursor.position() as usize;
    let spatial_len = if flags.has_spatial() {
        channels as usize * SPATIAL_STRIDE
    } else {
        0
    };
    require(bytes, payload_start + spatial_len, "spatial chunk")?;
    let payload_end = bytes.len() - spatial_len;

    let payload = &bytes[payload_start..payload_end];
    let stride = channels as usize * VALUE_WIDTH;
    if payload.len() % stride != 0 {
        return Err(BitwaveError::Alignment {
            len: payload.len(),
            stride,
        });
    }

    let mut samples = vec![0.0_f32; payload.len() / VALUE_WIDTH];
    Cursor::new(payload).read_f32_into::<LittleEndian>(&mut samples)?;

    let spatial = if flags.has_spatial() {
        let mut chunk = Cursor::new(&bytes[payload_end..]);
        let mut positions = Vec::with_capacity(channels as usize);
        for _ in 0..channels {
            positions.push(SpatialPosition {
                x: chunk.read_f32::<LittleEndian>()?,
                y: chunk.read_f32::<LittleEndian>()?,
                z: chunk.read_f32::<LittleEndian>()?,
            });
        }
        Some(positions)
    } else {
        None
    };

    let header = Header {
        version,
        flags,
        sample_rate,
        channels,
        duration_seconds,
        bpm,
    };
    let metadata = Metadata {
        bpm,
        spatial,
        reserved_flags: flags.reserved(),
    };
    let buffer = AudioBuffer::from_interleaved(samples, sample_rate, channels)?;

    Ok(Decoded {
        header,
        metadata,
        buffer,
    })
}

/// Serializes a buffer and its metadata into a new byte vector.
pub fn encode(buffer: &AudioBuffer, metadata: &Metadata) -> Result<Vec<u8>> {
    let spatial_len = metadata.spatial.as_ref().map_or(0, Vec::len) * SPATIAL_STRIDE;
    let mut bytes = Vec::with_capacity(
        HEADER_LEN + VALUE_WIDTH + buffer.samples().len() * VALUE_WIDTH + spatial_len,
    );
    write_to(&mut bytes, buffer, metadata)?;
    Ok(bytes)
}

/// Streams the encoded form of `buffer` into `writer`.
///
/// Validation happens before the first byte is written.
pub fn write_to<W: Write>(
    writer: &mut W,
    buffer: &AudioBuffer,
    metadata: &Metadata,
) -> Result<()> {
    if buffer.is_empty() {
        return Err(BitwaveError::InvalidBuffer("buffer has no frames".into()));
    }
    if let Some(spatial) = &metadata.spatial {
        if spatial.len() != buffer.channels() as usize {
            return Err(BitwaveError::InvalidArgument(format!(
                "spatial chunk has {} positions for {} channels",
                spatial.len(),
                buffer.channels()
            )));
        }
    }

    let duration_seconds = buffer.frame_count() as f32 / buffer.sample_rate() as f32;

    writer.write_all(MAGIC)?;
    writer.write_u8(VERSION)?;
    writer.write_u32::<LittleEndian>(metadata.flags().0)?;
    writer.write_u32::<LittleEndian>(buffer.sample_rate())?;
    writer.write_u8(buffer.channels())?;
    writer.write_f32::<LittleEndian>(duration_seconds)?;
    if let Some(bpm) = metadata.bpm {
        writer.write_f32::<LittleEndian>(bpm)?;
    }
    for &sample in buffer.samples() {
        writer.write_f32::<LittleEndian>(sample)?;
    }
    for position in metadata.spatial.iter().flatten() {
        writer.write_f32::<LittleEndian>(position.x)?;
        writer.write_f32::<LittleEndian>(position.y)?;
        writer.write_f32::<LittleEndian>(position.z)?;
    }

    Ok(())
}

fn require(bytes: &[u8], needed: usize, section: &'static str) -> Result<()> {
    if bytes.len() < needed {
        Err(BitwaveError::TruncatedFile {
            section,
            needed,
            available: bytes.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo() -> AudioBuffer {
        AudioBuffer::from_frames(&[[0.1, 0.2], [0.3, 0.4], [-0.5, 0.6], [0.0, 0.0]], 8).unwrap()
    }

    #[test]
    fn decodes_the_reference_stereo_file() {
        let bytes = encode(&stereo(), &Metadata::new()).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 8 * 4);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.header.flags.0 & Flags::BPM, 0);
        assert!((decoded.header.duration_seconds - 0.5).abs() < 1e-6);
        assert_eq!(decoded.header.bpm, None);
        assert_eq!(decoded.buffer, stereo());
        assert!(decoded.header.is_supported_version());
    }

    #[test]
    fn round_trips_optional_fields() {
        let spatial = vec![
            SpatialPosition::new(-1.0, 0.0, 0.5),
            SpatialPosition::new(1.0, 0.25, -0.5),
        ];
        let cases = [
            Metadata::new(),
            Metadata::new().with_bpm(0.0),
            Metadata::new().with_bpm(128.5),
            Metadata::new().with_spatial(spatial.clone()),
            Metadata::new().with_bpm(90.0).with_spatial(spatial),
        ];

        for metadata in cases {
            let bytes = encode(&stereo(), &metadata).unwrap();
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded.metadata, metadata);
            assert_eq!(decoded.buffer, stereo());
            assert_eq!(decoded.header.bpm, metadata.bpm);
        }
    }

    fn bits(values: &[f32]) -> Vec<u32> {
        values.iter().map(|value| value.to_bits()).collect()
    }

    fn spatial_bits(metadata: &Metadata) -> Option<Vec<[u32; 3]>> {
        metadata.spatial.as_ref().map(|positions| {
            positions
                .iter()
                .map(|p| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
                .collect()
        })
    }

    fn assert_bit_exact(buffer: &AudioBuffer, metadata: &Metadata) {
        let bytes = encode(buffer, metadata).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.buffer.sample_rate(), buffer.sample_rate());
        assert_eq!(decoded.buffer.channels(), buffer.channels());
        assert_eq!(bits(decoded.buffer.samples()), bits(buffer.samples()));
        assert_eq!(
            decoded.metadata.bpm.map(f32::to_bits),
            metadata.bpm.map(f32::to_bits)
        );
        assert_eq!(spatial_bits(&decoded.metadata), spatial_bits(metadata));
        assert_eq!(decoded.metadata.reserved_flags, metadata.reserved_flags);
        assert_eq!(encode(&decoded.buffer, &decoded.metadata).unwrap(), bytes);
    }

    #[test]
    fn round_trips_channel_counts_rates_and_bit_patterns() {
        let patterns = [
            0.0,
            -0.0,
            f32::from_bits(1),
            f32::MIN_POSITIVE,
            f32::MAX,
            f32::MIN,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NAN,
            f32::from_bits(0x7fc0_1234),
            f32::from_bits(0xffc0_0001),
            f32::EPSILON,
            -1.0,
            1.0,
        ];

        for channels in [1_u8, 2, 7, 255] {
            for sample_rate in [1, 7, 44_101, u32::MAX] {
                let frames = 3;
                let samples = (0..frames * channels as usize)
                    .map(|i| patterns[i % patterns.len()])
                    .collect();
                let buffer = AudioBuffer::from_interleaved(samples, sample_rate, channels).unwrap();
                let spatial = (0..channels)
                    .map(|c| {
                        let x = patterns[c as usize % patterns.len()];
                        SpatialPosition::new(x, c as f32, -0.0)
                    })
                    .collect::<Vec<_>>();

                let cases = [
                    Metadata::new(),
                    Metadata::new().with_bpm(f32::NAN),
                    Metadata::new().with_bpm(-0.0).with_spatial(spatial.clone()),
                    Metadata {
                        bpm: None,
                        spatial: Some(spatial),
                        reserved_flags: 0xffff_fffc,
                    },
                ];
                for metadata in &cases {
                    assert_bit_exact(&buffer, metadata);
                }
            }
        }
    }

    #[test]
    fn zero_bpm_is_not_absent_bpm() {
        let with_zero = encode(&stereo(), &Metadata::new().with_bpm(0.0)).unwrap();
        let without = encode(&stereo(), &Metadata::new()).unwrap();

        assert_eq!(with_zero.len(), without.len() + 4);
        assert_eq!(decode(&with_zero).unwrap().metadata.bpm, Some(0.0));
        assert_eq!(decode(&without).unwrap().metadata.bpm, None);
    }

    #[test]
    fn preserves_reserved_flag_bits() {
        let metadata = Metadata {
            bpm: Some(120.0),
            spatial: None,
            reserved_flags: 0x8000_0010,
        };
        let bytes = encode(&stereo(), &metadata).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.header.flags.0, 0x8000_0011);
        assert_eq!(decoded.metadata.reserved_flags, 0x8000_0010);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(&stereo(), &Metadata::new()).unwrap();
        bytes[0] = b'R';
        assert!(matches!(decode(&bytes), Err(BitwaveError::Format(_))));
        assert!(matches!(decode(b"RIFF"), Err(BitwaveError::Format(_))));
    }

    #[test]
    fn rejects_truncated_headers() {
        let bytes = encode(&stereo(), &Metadata::new().with_bpm(100.0)).unwrap();

        for len in [0, 2, 10, HEADER_LEN - 1, HEADER_LEN + 2] {
            let err = decode(&bytes[..len]).unwrap_err();
            assert!(
                matches!(err, BitwaveError::TruncatedFile { .. }),
                "length {len} gave {err}"
            );
        }
    }

    #[test]
    fn rejects_missing_spatial_chunk() {
        let mut bytes = encode(&stereo(), &Metadata::new()).unwrap();
        bytes[4] |= Flags::SPATIAL as u8;
        bytes.truncate(HEADER_LEN + 8);

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            BitwaveError::TruncatedFile {
                section: "spatial chunk",
                ..
            }
        ));
    }

    #[test]
    fn rejects_misaligned_payload() {
        let mut bytes = encode(&stereo(), &Metadata::new()).unwrap();
        bytes.pop();

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, BitwaveError::Alignment { len: 31, stride: 8 }));
    }

    #[test]
    fn reads_unknown_versions() {
        let mut bytes = encode(&stereo(), &Metadata::new()).unwrap();
        bytes[3] = 7;

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.header.version, 7);
        assert!(!decoded.header.is_supported_version());
        assert_eq!(decoded.buffer, stereo());
    }

    #[test]
    fn ignores_advisory_duration() {
        let mut bytes = encode(&stereo(), &Metadata::new()).unwrap();
        bytes[13..17].copy_from_slice(&1000.0_f32.to_le_bytes());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.buffer.frame_count(), 4);
    }

    #[test]
    fn header_only_file_has_no_frames() {
        let bytes = encode(&stereo(), &Metadata::new()).unwrap();
        let decoded = decode(&bytes[..HEADER_LEN]).unwrap();
        assert!(decoded.buffer.is_empty());
    }

    #[test]
    fn encode_rejects_empty_buffers_and_bad_spatial_chunks() {
        let empty = AudioBuffer::from_interleaved(Vec::new(), 8, 2).unwrap();
        assert!(matches!(
            encode(&empty, &Metadata::new()),
            Err(BitwaveError::InvalidBuffer(_))
        ));

        let metadata = Metadata::new().with_spatial(vec![SpatialPosition::default()]);
        assert!(matches!(
            encode(&stereo(), &metadata),
            Err(BitwaveError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_zero_sample_rate_and_channels() {
        let mut bytes = encode(&stereo(), &Metadata::new()).unwrap();
        bytes[8..12].copy_from_slice(&0_u32.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(BitwaveError::Format(_))));

        let mut bytes = encode(&stereo(), &Metadata::new()).unwrap();
        bytes[12] = 0;
        assert!(matches!(decode(&bytes), Err(BitwaveError::Format(_))));
    }
}
