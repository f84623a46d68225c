//! One 16×16×16 slab of a chunk column.
//!
//! Block states are stored as indices into a local palette when the bit
//! width is at most [`MAX_PALETTE_BITS`], and as raw global state ids
//! otherwise. State `0` is air.

use crate::bit_packed::BitPackedArray;
use crate::chunk_serial::ChunkSerError;
use crate::wire::{WireReader, var_int_len, write_var_int};

/// Side length of a section in blocks.
pub const SECTION_SIZE: usize = 16;

/// Blocks per section (16³).
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;

/// Bytes of one nibble-packed light array.
pub const LIGHT_BYTES: usize = SECTION_VOLUME / 2;

/// Widest bit width that still uses a local palette.
pub const MAX_PALETTE_BITS: u8 = 8;

/// Bit width used once a section outgrows its palette.
pub const GLOBAL_PALETTE_BITS: u8 = 13;

/// Smallest bit width written for palette sections.
const MIN_PALETTE_BITS: u8 = 4;

/// Block states and light for one vertical section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    /// Palette mapping local indices to global block states. Empty in
    /// global-palette mode.
    palette: Vec<u32>,
    /// Packed per-block indices (or raw states in global mode).
    blocks: BitPackedArray,
    /// Nibble-packed block light.
    block_light: Vec<u8>,
    /// Nibble-packed sky light, only in dimensions that have a sky.
    sky_light: Option<Vec<u8>>,
}

impl Section {
    /// The canonical placeholder used when a section is redacted: all air,
    /// no light.
    pub fn empty(has_sky_light: bool) -> Self {
        Self::filled(0, has_sky_light)
    }

    /// A section made entirely of one block state.
    pub fn filled(state: u32, has_sky_light: bool) -> Self {
        Self {
            palette: vec![state],
            blocks: BitPackedArray::new(MIN_PALETTE_BITS, SECTION_VOLUME),
            block_light: vec![0; LIGHT_BYTES],
            sky_light: has_sky_light.then(|| vec![0; LIGHT_BYTES]),
        }
    }

    /// Bits per block as written on the wire.
    pub fn bits_per_block(&self) -> u8 {
        self.blocks.bits()
    }

    pub fn has_sky_light(&self) -> bool {
        self.sky_light.is_some()
    }

    /// Block state at section-relative `(x, y, z)`, each in `0..16`.
    pub fn block_state(&self, x: usize, y: usize, z: usize) -> u32 {
        let raw = self.blocks.get(Self::index(x, y, z));
        if self.uses_palette() {
            // Out-of-range palette indices read as air.
            self.palette.get(raw as usize).copied().unwrap_or(0)
        } else {
            raw
        }
    }

    /// Set the block state at section-relative `(x, y, z)`, growing the
    /// palette (and the bit width) as needed.
    pub fn set_block_state(&mut self, x: usize, y: usize, z: usize, state: u32) {
        let index = Self::index(x, y, z);
        if !self.uses_palette() {
            self.blocks.set(index, state);
            return;
        }

        let palette_index = match self.palette.iter().position(|&s| s == state) {
            Some(i) => i,
            None => {
                self.palette.push(state);
                let needed = bits_for(self.palette.len());
                if needed > MAX_PALETTE_BITS {
                    self.switch_to_global_palette();
                    self.blocks.set(index, state);
                    return;
                }
                if needed > self.blocks.bits() {
                    self.blocks = self.blocks.resized(needed);
                }
                self.palette.len() - 1
            }
        };
        self.blocks.set(index, palette_index as u32);
    }

    /// Returns `true` if every block is air.
    pub fn is_air(&self) -> bool {
        if self.uses_palette() && self.palette.iter().all(|&s| s == 0) {
            return true;
        }
        (0..SECTION_VOLUME).all(|i| {
            let raw = self.blocks.get(i);
            if self.uses_palette() {
                self.palette.get(raw as usize).copied().unwrap_or(0) == 0
            } else {
                raw == 0
            }
        })
    }

    fn uses_palette(&self) -> bool {
        self.blocks.bits() <= MAX_PALETTE_BITS
    }

    fn switch_to_global_palette(&mut self) {
        let mut global = BitPackedArray::new(GLOBAL_PALETTE_BITS, SECTION_VOLUME);
        for i in 0..SECTION_VOLUME {
            let local = self.blocks.get(i) as usize;
            global.set(i, self.palette.get(local).copied().unwrap_or(0));
        }
        self.blocks = global;
        self.palette.clear();
    }

    fn index(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < SECTION_SIZE && y < SECTION_SIZE && z < SECTION_SIZE);
        (y * SECTION_SIZE + z) * SECTION_SIZE + x
    }

    /// Size of this section once encoded.
    pub(crate) fn encoded_len(&self) -> usize {
        let words = self.blocks.raw_data().len();
        1 + var_int_len(self.palette.len() as i32)
            + self
                .palette
                .iter()
                .map(|&s| var_int_len(s as i32))
                .sum::<usize>()
            + var_int_len(words as i32)
            + words * 8
            + LIGHT_BYTES
            + self.sky_light.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.blocks.bits());
        write_var_int(buf, self.palette.len() as i32);
        for &state in &self.palette {
            write_var_int(buf, state as i32);
        }
        let words = self.blocks.raw_data();
        write_var_int(buf, words.len() as i32);
        for word in words {
            buf.extend_from_slice(&word.to_be_bytes());
        }
        buf.extend_from_slice(&self.block_light);
        if let Some(sky) = &self.sky_light {
            buf.extend_from_slice(sky);
        }
    }

    pub(crate) fn decode(r: &mut WireReader<'_>, has_sky_light: bool) -> Result<Self, ChunkSerError> {
        let bits = r.read_u8()?;
        if !(1..=32).contains(&bits) {
            return Err(ChunkSerError::InvalidBitsPerBlock(bits));
        }

        let palette_len = r.read_len()?;
        let mut palette = Vec::with_capacity(palette_len.min(256));
        for _ in 0..palette_len {
            let state = r.read_var_int()?;
            let state = u32::try_from(state).map_err(|_| ChunkSerError::InvalidPaletteEntry(state))?;
            palette.push(state);
        }

        let expected = BitPackedArray::word_count(bits, SECTION_VOLUME);
        let actual = r.read_len()?;
        if actual != expected {
            return Err(ChunkSerError::LongCountMismatch { expected, actual });
        }
        let mut words = Vec::with_capacity(expected);
        for _ in 0..expected {
            words.push(r.read_u64()?);
        }
        let blocks = BitPackedArray::from_raw(bits, SECTION_VOLUME, words)
            .ok_or(ChunkSerError::InvalidBitsPerBlock(bits))?;

        let block_light = r.read_bytes(LIGHT_BYTES)?.to_vec();
        let sky_light = if has_sky_light {
            Some(r.read_bytes(LIGHT_BYTES)?.to_vec())
        } else {
            None
        };

        Ok(Self {
            palette,
            blocks,
            block_light,
            sky_light,
        })
    }
}

/// Bits needed to index a palette of `len` entries, never below the
/// minimum palette width.
fn bits_for(len: usize) -> u8 {
    let bits = usize::BITS - len.saturating_sub(1).leading_zeros();
    (bits as u8).max(MIN_PALETTE_BITS)
}
