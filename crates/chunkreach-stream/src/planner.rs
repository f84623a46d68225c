//! Pure chunk selection rules: which extra chunks to accept, which to
//! request, and which to drop when over the cap or out of range.
//!
//! Distances follow the game's convention: a chunk at Chebyshev offset `n`
//! from the player sits at render distance `n + 1`. Ranking always uses
//! taxicab distance, with `(x, z)` breaking ties so results are stable.

use chunkreach_coords::Pos2;
use rustc_hash::FxHashSet;

// ---------------------------------------------------------------------------
// Distance band
// ---------------------------------------------------------------------------

/// Render distance at which `pos` is visible from `player`.
pub fn render_distance_of(pos: Pos2, player: Pos2) -> i64 {
    1 + pos.chebyshev_distance(player)
}

/// Verdict on an extra chunk offered by the auxiliary server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// Beyond the client's render distance.
    TooFar,
    /// Inside the region the game server supplies itself.
    TooClose,
}

/// Extra chunks are only useful in the ring between the server's render
/// distance (exclusive) and the client's (inclusive).
pub fn classify_extra_chunk(
    pos: Pos2,
    player: Pos2,
    render_distance: i32,
    server_render_distance: i32,
) -> Admission {
    let distance = render_distance_of(pos, player);
    if distance > i64::from(render_distance) {
        Admission::TooFar
    } else if distance <= i64::from(server_render_distance) {
        Admission::TooClose
    } else {
        Admission::Accept
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

fn rank_key(player: Pos2) -> impl Fn(&Pos2) -> (i64, i32, i32) {
    move |pos| (pos.taxicab_distance(player), pos.x, pos.z)
}

/// Sort closest first.
pub fn sort_by_taxicab(positions: &mut [Pos2], player: Pos2) {
    positions.sort_unstable_by_key(rank_key(player));
}

// ---------------------------------------------------------------------------
// Requests and unloading
// ---------------------------------------------------------------------------

/// Positions to ask the auxiliary server for, closest first, at most
/// `limit` of them.
///
/// Candidates cover the square of radius `render_distance` around the
/// player, minus the server's own region and anything already loaded.
pub fn request_candidates(
    player: Pos2,
    render_distance: i32,
    server_render_distance: i32,
    loaded: &FxHashSet<Pos2>,
    limit: usize,
) -> Vec<Pos2> {
    let server_rd = i64::from(server_render_distance);
    let mut candidates: Vec<Pos2> = player
        .square_around(render_distance)
        .filter(|&pos| render_distance_of(pos, player) > server_rd)
        .filter(|pos| !loaded.contains(pos))
        .collect();
    sort_by_taxicab(&mut candidates, player);
    candidates.truncate(limit);
    candidates
}

/// Loaded positions beyond the `cap` closest to the player. Empty when at
/// or under the cap.
pub fn eviction_victims(
    loaded: impl IntoIterator<Item = Pos2>,
    player: Pos2,
    cap: usize,
) -> Vec<Pos2> {
    let mut ranked: Vec<Pos2> = loaded.into_iter().collect();
    if ranked.len() <= cap {
        return Vec::new();
    }
    sort_by_taxicab(&mut ranked, player);
    ranked.split_off(cap)
}

/// Loaded positions the client can no longer see, closest first.
pub fn outside_render_distance(
    loaded: impl IntoIterator<Item = Pos2>,
    player: Pos2,
    render_distance: i32,
) -> Vec<Pos2> {
    let rd = i64::from(render_distance);
    let mut outside: Vec<Pos2> = loaded
        .into_iter()
        .filter(|&pos| render_distance_of(pos, player) > rd)
        .collect();
    sort_by_taxicab(&mut outside, player);
    outside
}
