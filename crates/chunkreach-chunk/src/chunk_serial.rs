//! Binary serialization and deserialization for [`ChunkData`].
//!
//! This is the chunk packet layout exchanged with the auxiliary server. All
//! fixed-width integers are big-endian.
//!
//! ## Binary Layout
//!
//! | Field | Encoding |
//! |-------|----------|
//! | chunk x, chunk z | `i32`, `i32` |
//! | full chunk | `u8` (0 or 1) |
//! | section mask | VarInt, bit `i` = section `i` present |
//! | data length | VarInt, bytes of sections + biomes |
//! | sections | ascending index, see below |
//! | biomes | 256 bytes, full chunks only |
//!
//! Each section is `bits_per_block: u8`, a VarInt-prefixed VarInt palette, a
//! VarInt-prefixed run of `u64` words, 2048 bytes of block light and, in
//! dimensions with a sky, 2048 bytes of sky light.
//!
//! Sky-light presence is not on the wire. Decoding tries with sky light
//! first and falls back to without when the sections don't account for the
//! declared data length exactly.
//!
//! Block entities are not part of this format. They are empty after decode
//! and dropped on encode. A single trailing zero byte (an empty block-entity
//! count) is tolerated on decode.

use chunkreach_coords::Pos2;

use crate::chunk::{BIOME_BYTES, ChunkData, SECTION_COUNT};
use crate::section::Section;
use crate::wire::{WireError, WireReader, write_var_int};

/// Errors that can occur during chunk deserialization.
#[derive(Debug, thiserror::Error)]
pub enum ChunkSerError {
    /// A primitive read failed.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The section mask has bits outside the 16 sections.
    #[error("invalid section mask: {0:#x}")]
    InvalidSectionMask(i32),
    /// A section declared a bit width outside 1..=32.
    #[error("invalid bits per block: {0}")]
    InvalidBitsPerBlock(u8),
    /// A palette entry was negative.
    #[error("invalid palette entry: {0}")]
    InvalidPaletteEntry(i32),
    /// A section's word count does not match its bit width.
    #[error("section data has {actual} longs, expected {expected}")]
    LongCountMismatch {
        /// Words implied by the bit width.
        expected: usize,
        /// Words declared on the wire.
        actual: usize,
    },
    /// The declared data length does not fit the available bytes or the
    /// biome block.
    #[error("declared data length {declared} does not fit {available} available bytes")]
    DataLengthMismatch {
        /// Length from the header.
        declared: usize,
        /// Bytes actually available.
        available: usize,
    },
    /// The sections did not consume the section data exactly.
    #[error("{leftover} bytes of section data left over")]
    SectionLayoutMismatch {
        /// Bytes left after the last section.
        leftover: usize,
    },
    /// Unexpected bytes after the chunk data.
    #[error("{0} trailing bytes after chunk data")]
    TrailingBytes(usize),
}

impl ChunkData {
    /// Serializes this chunk to a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Appends the serialized chunk to `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        let pos = self.pos();
        let sections = self.sections().iter().flatten();
        let biome_len = if self.is_full_chunk() { BIOME_BYTES } else { 0 };
        let data_len: usize = sections.clone().map(Section::encoded_len).sum::<usize>() + biome_len;

        buf.reserve(16 + data_len);
        buf.extend_from_slice(&pos.x.to_be_bytes());
        buf.extend_from_slice(&pos.z.to_be_bytes());
        buf.push(u8::from(self.is_full_chunk()));
        write_var_int(buf, i32::from(self.section_mask()));
        write_var_int(buf, data_len as i32);

        for section in sections {
            section.encode(buf);
        }

        if self.is_full_chunk() {
            match self.biomes() {
                Some(biomes) if biomes.len() == BIOME_BYTES => buf.extend_from_slice(biomes),
                _ => buf.resize(buf.len() + BIOME_BYTES, 0),
            }
        }
    }

    /// Deserializes a chunk from a byte slice.
    pub fn deserialize(data: &[u8]) -> Result<Self, ChunkSerError> {
        let mut r = WireReader::new(data);

        let x = r.read_i32()?;
        let z = r.read_i32()?;
        let full_chunk = r.read_u8()? != 0;

        let mask = r.read_var_int()?;
        if !(0..=0xFFFF).contains(&mask) {
            return Err(ChunkSerError::InvalidSectionMask(mask));
        }
        let mask = mask as u16;

        let declared = r.read_len()?;
        if declared > r.remaining() {
            return Err(ChunkSerError::DataLengthMismatch {
                declared,
                available: r.remaining(),
            });
        }
        let blob = r.read_bytes(declared)?;

        match r.rest() {
            [] | [0] => {}
            rest => return Err(ChunkSerError::TrailingBytes(rest.len())),
        }

        let biome_len = if full_chunk { BIOME_BYTES } else { 0 };
        if blob.len() < biome_len {
            return Err(ChunkSerError::DataLengthMismatch {
                declared,
                available: blob.len(),
            });
        }
        let (section_bytes, biome_bytes) = blob.split_at(blob.len() - biome_len);

        let (sections, has_sky_light) = match decode_sections(section_bytes, mask, true) {
            Ok(sections) => (sections, true),
            Err(with_sky) => match decode_sections(section_bytes, mask, false) {
                Ok(sections) => (sections, false),
                Err(_) => return Err(with_sky),
            },
        };

        let biomes = full_chunk.then(|| biome_bytes.to_vec());
        Ok(ChunkData::from_parts(
            Pos2::new(x, z),
            full_chunk,
            has_sky_light,
            sections,
            biomes,
        ))
    }
}

fn decode_sections(
    bytes: &[u8],
    mask: u16,
    has_sky_light: bool,
) -> Result<[Option<Section>; SECTION_COUNT], ChunkSerError> {
    let mut r = WireReader::new(bytes);
    let mut sections: [Option<Section>; SECTION_COUNT] = std::array::from_fn(|_| None);
    for (i, slot) in sections.iter_mut().enumerate() {
        if mask & (1 << i) != 0 {
            *slot = Some(Section::decode(&mut r, has_sky_light)?);
        }
    }
    if !r.is_empty() {
        return Err(ChunkSerError::SectionLayoutMismatch {
            leftover: r.remaining(),
        });
    }
    Ok(sections)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
