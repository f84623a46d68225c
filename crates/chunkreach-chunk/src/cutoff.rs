//! Underground cutoff decisions for outbound chunks.
//!
//! Before a game chunk is forwarded to the auxiliary server, every section
//! below the cutoff index is replaced by the canonical empty section. The
//! policy sees the chunk with its height map already computed.

use crate::chunk::{ChunkData, SECTION_COUNT};
use crate::section::SECTION_SIZE;

/// Decides how many bottom sections of a chunk to redact.
pub trait CutoffPolicy: Send + Sync {
    /// Section index in `0..=16`. Sections strictly below it are redacted.
    fn decide_underground_cutoff(&self, chunk: &ChunkData) -> usize;
}

impl<F> CutoffPolicy for F
where
    F: Fn(&ChunkData) -> usize + Send + Sync,
{
    fn decide_underground_cutoff(&self, chunk: &ChunkData) -> usize {
        self(chunk)
    }
}

/// Never redacts anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepAllSections;

impl CutoffPolicy for KeepAllSections {
    fn decide_underground_cutoff(&self, _chunk: &ChunkData) -> usize {
        0
    }
}

/// Redacts sections lying entirely below the lowest surface block of the
/// column, keeping `margin_sections` extra sections under it.
#[derive(Clone, Copy, Debug)]
pub struct BelowLowestSurface {
    pub margin_sections: usize,
}

impl Default for BelowLowestSurface {
    fn default() -> Self {
        Self { margin_sections: 1 }
    }
}

impl CutoffPolicy for BelowLowestSurface {
    fn decide_underground_cutoff(&self, chunk: &ChunkData) -> usize {
        let Some(lowest) = chunk.height_map().and_then(|map| map.lowest_surface()) else {
            return 0;
        };
        (usize::from(lowest) / SECTION_SIZE)
            .saturating_sub(self.margin_sections)
            .min(SECTION_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkreach_coords::Pos2;

    const STONE: u32 = 1 << 4;

    #[test]
    fn test_keep_all_sections_is_zero() {
        let mut chunk = ChunkData::flat(Pos2::new(0, 0), &[STONE; 100]);
        chunk.compute_height_map();
        assert_eq!(KeepAllSections.decide_underground_cutoff(&chunk), 0);
    }

    #[test]
    fn test_closure_policy() {
        let policy = |chunk: &ChunkData| chunk.section_mask().count_ones() as usize;
        let chunk = ChunkData::flat(Pos2::new(0, 0), &[STONE; 40]);
        assert_eq!(policy.decide_underground_cutoff(&chunk), 3);
    }

    #[test]
    fn test_below_lowest_surface_keeps_margin() {
        // Surface at y=70, section 4.
        let mut chunk = ChunkData::flat(Pos2::new(0, 0), &[STONE; 71]);
        chunk.compute_height_map();
        let policy = BelowLowestSurface { margin_sections: 1 };
        assert_eq!(policy.decide_underground_cutoff(&chunk), 3);
        let policy = BelowLowestSurface { margin_sections: 0 };
        assert_eq!(policy.decide_underground_cutoff(&chunk), 4);
    }

    #[test]
    fn test_below_lowest_surface_uses_lowest_column() {
        let mut chunk = ChunkData::flat(Pos2::new(0, 0), &[STONE; 100]);
        for y in 20..100 {
            chunk.set_block_state(5, y, 5, 0);
        }
        chunk.compute_height_map();
        let policy = BelowLowestSurface { margin_sections: 0 };
        assert_eq!(policy.decide_underground_cutoff(&chunk), 1);
    }

    #[test]
    fn test_below_lowest_surface_without_height_map() {
        let chunk = ChunkData::flat(Pos2::new(0, 0), &[STONE; 100]);
        assert_eq!(BelowLowestSurface::default().decide_underground_cutoff(&chunk), 0);
    }

    #[test]
    fn test_policy_drives_redaction() {
        let mut chunk = ChunkData::flat(Pos2::new(0, 0), &[STONE; 100]);
        chunk.compute_height_map();
        let cutoff = BelowLowestSurface::default().decide_underground_cutoff(&chunk);
        assert_eq!(chunk.redact_below(cutoff), 5);
        assert_eq!(chunk.block_state(0, 10, 0), 0);
        assert_eq!(chunk.block_state(0, 90, 0), STONE);
    }
}
