//! Chunk-grid coordinates for the horizontal plane.
//!
//! A [`Pos2`] addresses one chunk column. Two metrics are used throughout the
//! workspace and must not be mixed up:
//!
//! - **Chebyshev** distance, `max(|dx|, |dz|)`, measures membership in the
//!   square render regions that game clients and servers advertise.
//! - **Taxicab** distance, `|dx| + |dz|`, ranks chunks for requests and
//!   eviction.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer chunk-grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos2 {
    /// Chunk X.
    pub x: i32,
    /// Chunk Z.
    pub z: i32,
}

impl Pos2 {
    /// Create a new position.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// `max(|dx|, |dz|)`. Computed in `i64` so extreme coordinates cannot overflow.
    pub fn chebyshev_distance(self, other: Pos2) -> i64 {
        let (dx, dz) = self.abs_delta(other);
        dx.max(dz)
    }

    /// `|dx| + |dz|`.
    pub fn taxicab_distance(self, other: Pos2) -> i64 {
        let (dx, dz) = self.abs_delta(other);
        dx + dz
    }

    fn abs_delta(self, other: Pos2) -> (i64, i64) {
        let dx = (i64::from(self.x) - i64::from(other.x)).abs();
        let dz = (i64::from(self.z) - i64::from(other.z)).abs();
        (dx, dz)
    }

    /// Every position in the square of the given `radius` around `self`,
    /// row by row (x outer, z inner). A negative radius yields nothing.
    pub fn square_around(self, radius: i32) -> impl Iterator<Item = Pos2> {
        let r = i64::from(radius.max(-1));
        let (cx, cz) = (i64::from(self.x), i64::from(self.z));
        (cx - r..=cx + r).flat_map(move |x| {
            (cz - r..=cz + r).filter_map(move |z| {
                Some(Pos2::new(i32::try_from(x).ok()?, i32::try_from(z).ok()?))
            })
        })
    }
}

impl fmt::Display for Pos2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

impl From<(i32, i32)> for Pos2 {
    fn from((x, z): (i32, i32)) -> Self {
        Self::new(x, z)
    }
}
