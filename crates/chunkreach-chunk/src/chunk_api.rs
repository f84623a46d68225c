//! High-level chunk handle passed between the game, the controller and the
//! network link.
//!
//! [`Chunk`] pairs a column position with its [`ChunkData`] and offers
//! bounds-checked block access. Out-of-bounds access is handled gracefully
//! without panics.

use chunkreach_coords::Pos2;

use crate::chunk::{CHUNK_WIDTH, ChunkData, SECTION_COUNT};
use crate::chunk_serial::ChunkSerError;
use crate::section::SECTION_SIZE;

/// Height of a chunk column in blocks.
const COLUMN_HEIGHT: usize = SECTION_COUNT * SECTION_SIZE;

/// A chunk column at a known position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub pos: Pos2,
    pub data: ChunkData,
}

impl Chunk {
    /// Wraps decoded data, taking the position from it.
    pub fn from_data(data: ChunkData) -> Self {
        Self {
            pos: data.pos(),
            data,
        }
    }

    /// An all-air full chunk with sky light.
    pub fn empty(pos: Pos2) -> Self {
        Self::from_data(ChunkData::new(pos, true, true))
    }

    /// Decodes a chunk from its wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, ChunkSerError> {
        ChunkData::deserialize(bytes).map(Self::from_data)
    }

    pub fn into_data(self) -> ChunkData {
        self.data
    }

    /// Returns the block state at `(x, y, z)`.
    ///
    /// Returns air if any coordinate is out of bounds.
    pub fn get(&self, x: usize, y: usize, z: usize) -> u32 {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("Chunk::get out of bounds: ({}, {}, {})", x, y, z);
            return 0;
        }
        self.data.block_state(x, y, z)
    }

    /// Sets the block state at `(x, y, z)`.
    ///
    /// No-op with a warning log if any coordinate is out of bounds.
    pub fn set(&mut self, x: usize, y: usize, z: usize, state: u32) {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("Chunk::set out of bounds: ({}, {}, {})", x, y, z);
            return;
        }
        self.data.set_block_state(x, y, z, state);
    }

    fn in_bounds(x: usize, y: usize, z: usize) -> bool {
        x < CHUNK_WIDTH && y < COLUMN_HEIGHT && z < CHUNK_WIDTH
    }
}

impl From<ChunkData> for Chunk {
    fn from(data: ChunkData) -> Self {
        Self::from_data(data)
    }
}
