//! In-memory [`GameHost`] for headless sessions and tests.
//!
//! World tasks are queued rather than run; whoever plays the world thread
//! calls [`MemoryHost::run_pending_tasks`].

use std::collections::VecDeque;
use std::sync::{Mutex, Weak};

use chunkreach_chunk::Chunk;
use chunkreach_coords::Pos2;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::host::{GameChunkReceiver, GameHost, WorldTask};

/// A world mutation, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldOp {
    Load(Pos2),
    Unload(Pos2),
}

struct World {
    ingame: bool,
    server_address: Option<String>,
    player: Pos2,
    dimension: i32,
    render_distance: i32,
    chunks: FxHashMap<Pos2, Chunk>,
    receiver: Option<Weak<dyn GameChunkReceiver>>,
    history: Vec<WorldOp>,
}

/// Simulated game client state.
pub struct MemoryHost {
    world: Mutex<World>,
    tasks: Mutex<VecDeque<WorldTask>>,
}

impl MemoryHost {
    /// A client that is not in a game yet.
    pub fn new(player: Pos2, render_distance: i32) -> Self {
        Self {
            world: Mutex::new(World {
                ingame: false,
                server_address: None,
                player,
                dimension: 0,
                render_distance,
                chunks: FxHashMap::default(),
                receiver: None,
                history: Vec::new(),
            }),
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    /// Join `address`. A new session starts without a chunk receiver.
    pub fn join_game(&self, address: impl Into<String>) {
        self.join(Some(address.into()));
    }

    /// In game, but with no address known for the server.
    pub fn join_without_address(&self) {
        self.join(None);
    }

    fn join(&self, address: Option<String>) {
        let mut world = self.world.lock().unwrap();
        world.ingame = true;
        world.server_address = address;
        world.receiver = None;
    }

    /// Leave the game and drop the world.
    pub fn leave_game(&self) {
        let mut world = self.world.lock().unwrap();
        world.ingame = false;
        world.server_address = None;
        world.receiver = None;
        world.chunks.clear();
    }

    pub fn set_player(&self, pos: Pos2) {
        self.world.lock().unwrap().player = pos;
    }

    pub fn set_dimension(&self, dimension: i32) {
        self.world.lock().unwrap().dimension = dimension;
    }

    pub fn set_render_distance(&self, render_distance: i32) {
        self.world.lock().unwrap().render_distance = render_distance;
    }

    pub fn chunk(&self, pos: Pos2) -> Option<Chunk> {
        self.world.lock().unwrap().chunks.get(&pos).cloned()
    }

    pub fn loaded_count(&self) -> usize {
        self.world.lock().unwrap().chunks.len()
    }

    /// Drain the load/unload log.
    pub fn take_history(&self) -> Vec<WorldOp> {
        std::mem::take(&mut self.world.lock().unwrap().history)
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Run queued world tasks, including any they queue, until none are
    /// left. Returns how many ran.
    pub fn run_pending_tasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(task) = self.tasks.lock().unwrap().pop_front() else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    /// Hand a chunk from the game server to the installed receiver.
    /// Returns `false` when there is none.
    pub fn deliver_game_chunk(&self, chunk: Chunk) -> bool {
        let receiver = self
            .world
            .lock()
            .unwrap()
            .receiver
            .as_ref()
            .and_then(Weak::upgrade);
        match receiver {
            Some(receiver) => {
                receiver.on_receive_game_chunk(chunk);
                true
            }
            None => false,
        }
    }
}

impl GameHost for MemoryHost {
    fn is_ingame(&self) -> bool {
        self.world.lock().unwrap().ingame
    }

    fn current_server_address(&self) -> Option<String> {
        self.world.lock().unwrap().server_address.clone()
    }

    fn player_chunk_pos(&self) -> Pos2 {
        self.world.lock().unwrap().player
    }

    fn player_dimension(&self) -> i32 {
        self.world.lock().unwrap().dimension
    }

    fn render_distance(&self) -> i32 {
        self.world.lock().unwrap().render_distance
    }

    fn loaded_chunks(&self) -> FxHashSet<Pos2> {
        self.world.lock().unwrap().chunks.keys().copied().collect()
    }

    fn load_chunk(&self, chunk: Chunk) {
        let mut world = self.world.lock().unwrap();
        world.history.push(WorldOp::Load(chunk.pos));
        world.chunks.insert(chunk.pos, chunk);
    }

    fn unload_chunk(&self, pos: Pos2) {
        let mut world = self.world.lock().unwrap();
        world.history.push(WorldOp::Unload(pos));
        world.chunks.remove(&pos);
    }

    fn run_on_world_thread(&self, task: WorldTask) {
        self.tasks.lock().unwrap().push_back(task);
    }

    fn insert_chunk_receiver(&self, receiver: Weak<dyn GameChunkReceiver>) {
        self.world.lock().unwrap().receiver = Some(receiver);
    }

    fn was_receiver_inserted(&self) -> bool {
        self.world.lock().unwrap().receiver.is_some()
    }
}
