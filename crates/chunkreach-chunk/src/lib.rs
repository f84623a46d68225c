//! Chunk column storage with palette compression, the auxiliary server's chunk
//! wire format, and underground cutoff policies.

pub mod bit_packed;
pub mod chunk;
pub mod chunk_api;
pub mod chunk_serial;
pub mod cutoff;
pub mod section;
pub mod wire;

pub use chunk::{BIOME_BYTES, CHUNK_WIDTH, ChunkData, HeightMap, SECTION_COUNT, TileEntity};
pub use chunk_api::Chunk;
pub use chunk_serial::ChunkSerError;
pub use cutoff::{BelowLowestSurface, CutoffPolicy, KeepAllSections};
pub use section::{SECTION_SIZE, Section};
pub use wire::{WireError, WireReader, write_var_int};
