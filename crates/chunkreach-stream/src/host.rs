//! The game client as seen by the controller.
//!
//! The controller never touches world storage directly. It queries and
//! mutates the world through [`GameHost`], and every mutation is wrapped in
//! a [`WorldTask`] handed to [`GameHost::run_on_world_thread`].

use std::sync::Weak;

use chunkreach_chunk::Chunk;
use chunkreach_coords::Pos2;
use rustc_hash::FxHashSet;

/// Deferred work that must run on the thread owning the game world.
pub type WorldTask = Box<dyn FnOnce() + Send + 'static>;

/// Receives chunks the game server sends to the client.
pub trait GameChunkReceiver: Send + Sync {
    fn on_receive_game_chunk(&self, chunk: Chunk);
}

/// Queries and commands against the running game client.
pub trait GameHost: Send + Sync + 'static {
    /// `true` while connected to a game server with a world loaded.
    fn is_ingame(&self) -> bool;

    /// Address of the game server, as the user entered it.
    fn current_server_address(&self) -> Option<String>;

    fn player_chunk_pos(&self) -> Pos2;

    fn player_dimension(&self) -> i32;

    /// Client render distance in chunks.
    fn render_distance(&self) -> i32;

    fn loaded_chunks(&self) -> FxHashSet<Pos2>;

    /// World thread only.
    fn load_chunk(&self, chunk: Chunk);

    /// World thread only. Unloading an absent chunk is a no-op.
    fn unload_chunk(&self, pos: Pos2);

    /// Queue `task` on the world thread.
    fn run_on_world_thread(&self, task: WorldTask);

    /// Route game chunks to `receiver` for the rest of the session.
    fn insert_chunk_receiver(&self, receiver: Weak<dyn GameChunkReceiver>);

    /// Whether a receiver is already installed for this session.
    fn was_receiver_inserted(&self) -> bool;
}
