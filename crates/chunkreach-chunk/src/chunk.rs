//! Structured chunk column: up to 16 sections stacked bottom to top, biome
//! data, and the derived height map.
//!
//! The height map must be computed before any sections are redacted, since
//! the cutoff decision is made from the unredacted terrain.
//! [`ChunkData::redact_below`] computes it on demand to keep that ordering.

use chunkreach_coords::Pos2;

use crate::section::{SECTION_SIZE, Section};

/// Number of vertical sections in a chunk column.
pub const SECTION_COUNT: usize = 16;

/// Width of a chunk column in blocks along X and Z.
pub const CHUNK_WIDTH: usize = 16;

/// Bytes of per-column biome ids in a full chunk.
pub const BIOME_BYTES: usize = CHUNK_WIDTH * CHUNK_WIDTH;

/// Opaque serialized block entity (NBT) attached to a chunk by the game.
/// Never part of the auxiliary wire format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileEntity(pub Vec<u8>);

/// Highest non-empty block of each column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeightMap {
    /// Indexed `z * 16 + x`. `None` for a column that is entirely air.
    columns: [Option<u8>; CHUNK_WIDTH * CHUNK_WIDTH],
}

impl HeightMap {
    /// Block-y of the top non-empty block in column `(x, z)`.
    pub fn get(&self, x: usize, z: usize) -> Option<u8> {
        self.columns[z * CHUNK_WIDTH + x]
    }

    /// Lowest top-block over all non-empty columns.
    pub fn lowest_surface(&self) -> Option<u8> {
        self.columns.iter().flatten().copied().min()
    }
}

/// Decoded terrain of one chunk column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkData {
    pos: Pos2,
    full_chunk: bool,
    has_sky_light: bool,
    sections: [Option<Section>; SECTION_COUNT],
    biomes: Option<Vec<u8>>,
    tile_entities: Vec<TileEntity>,
    height_map: Option<HeightMap>,
}

impl ChunkData {
    /// An all-air column. Full chunks carry zeroed biome data.
    pub fn new(pos: Pos2, full_chunk: bool, has_sky_light: bool) -> Self {
        Self {
            pos,
            full_chunk,
            has_sky_light,
            sections: std::array::from_fn(|_| None),
            biomes: full_chunk.then(|| vec![0; BIOME_BYTES]),
            tile_entities: Vec::new(),
            height_map: None,
        }
    }

    /// A full column built from horizontal layers, bottom first: layer `i`
    /// fills block-y `i` with the given state.
    pub fn flat(pos: Pos2, layers: &[u32]) -> Self {
        let mut chunk = Self::new(pos, true, true);
        for (y, &state) in layers.iter().enumerate().take(SECTION_COUNT * SECTION_SIZE) {
            if state == 0 {
                continue;
            }
            for z in 0..CHUNK_WIDTH {
                for x in 0..CHUNK_WIDTH {
                    chunk.set_block_state(x, y, z, state);
                }
            }
        }
        chunk
    }

    pub(crate) fn from_parts(
        pos: Pos2,
        full_chunk: bool,
        has_sky_light: bool,
        sections: [Option<Section>; SECTION_COUNT],
        biomes: Option<Vec<u8>>,
    ) -> Self {
        Self {
            pos,
            full_chunk,
            has_sky_light,
            sections,
            biomes,
            tile_entities: Vec::new(),
            height_map: None,
        }
    }

    pub fn pos(&self) -> Pos2 {
        self.pos
    }

    /// `true` when this column replaces the client's copy entirely.
    pub fn is_full_chunk(&self) -> bool {
        self.full_chunk
    }

    pub fn has_sky_light(&self) -> bool {
        self.has_sky_light
    }

    /// Section `index` (0 = bottom), if present.
    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)?.as_ref()
    }

    /// All section slots, bottom first.
    pub fn sections(&self) -> &[Option<Section>; SECTION_COUNT] {
        &self.sections
    }

    /// Replace section `index`. Invalidates the height map.
    pub fn set_section(&mut self, index: usize, section: Option<Section>) {
        if let Some(slot) = self.sections.get_mut(index) {
            *slot = section;
            self.height_map = None;
        }
    }

    /// Bit `i` is set when section `i` is present.
    pub fn section_mask(&self) -> u16 {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    pub fn biomes(&self) -> Option<&[u8]> {
        self.biomes.as_deref()
    }

    pub fn tile_entities(&self) -> &[TileEntity] {
        &self.tile_entities
    }

    /// Attach block entities supplied by the game. They are dropped by
    /// [`ChunkData::serialize`].
    pub fn set_tile_entities(&mut self, tile_entities: Vec<TileEntity>) {
        self.tile_entities = tile_entities;
    }

    /// Block state at column-relative `(x, z)` and absolute block-y.
    pub fn block_state(&self, x: usize, y: usize, z: usize) -> u32 {
        match self.section(y / SECTION_SIZE) {
            Some(section) => section.block_state(x, y % SECTION_SIZE, z),
            None => 0,
        }
    }

    /// Set a block, creating its section if needed. Invalidates the height map.
    pub fn set_block_state(&mut self, x: usize, y: usize, z: usize, state: u32) {
        let index = y / SECTION_SIZE;
        if index >= SECTION_COUNT {
            tracing::warn!("set_block_state above build height: y={}", y);
            return;
        }
        let has_sky_light = self.has_sky_light;
        self.sections[index]
            .get_or_insert_with(|| Section::empty(has_sky_light))
            .set_block_state(x, y % SECTION_SIZE, z, state);
        self.height_map = None;
    }

    /// The height map, if it has been computed since the last mutation.
    pub fn height_map(&self) -> Option<&HeightMap> {
        self.height_map.as_ref()
    }

    /// Scan every column from the top section down and record its highest
    /// non-empty block.
    pub fn compute_height_map(&mut self) -> &HeightMap {
        let solid: [Option<&Section>; SECTION_COUNT] =
            std::array::from_fn(|i| self.sections[i].as_ref().filter(|s| !s.is_air()));
        let mut columns = [None; CHUNK_WIDTH * CHUNK_WIDTH];
        for z in 0..CHUNK_WIDTH {
            for x in 0..CHUNK_WIDTH {
                columns[z * CHUNK_WIDTH + x] = column_top(&solid, x, z);
            }
        }
        self.height_map.insert(HeightMap { columns })
    }

    /// Replace every present section with index strictly below `cutoff`
    /// by the canonical empty section. Returns how many were replaced.
    ///
    /// The height map is computed first if needed and is kept as it was
    /// before redaction.
    pub fn redact_below(&mut self, cutoff: usize) -> usize {
        if self.height_map.is_none() {
            self.compute_height_map();
        }
        let has_sky_light = self.has_sky_light;
        let mut replaced = 0;
        for slot in self.sections.iter_mut().take(cutoff.min(SECTION_COUNT)) {
            if slot.is_some() {
                *slot = Some(Section::empty(has_sky_light));
                replaced += 1;
            }
        }
        replaced
    }
}

fn column_top(sections: &[Option<&Section>], x: usize, z: usize) -> Option<u8> {
    for (index, section) in sections.iter().enumerate().rev() {
        let Some(section) = section else { continue };
        for y in (0..SECTION_SIZE).rev() {
            if section.block_state(x, y, z) != 0 {
                return Some((index * SECTION_SIZE + y) as u8);
            }
        }
    }
    None
}
