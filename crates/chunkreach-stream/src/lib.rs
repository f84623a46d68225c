//! Extra chunk admission: which chunks from the auxiliary server enter the
//! client world, which are requested, and which are dropped.

pub mod controller;
pub mod host;
pub mod memory_host;
pub mod planner;

pub use controller::AdmissionController;
pub use host::{GameChunkReceiver, GameHost, WorldTask};
pub use memory_host::{MemoryHost, WorldOp};
pub use planner::{
    Admission, classify_extra_chunk, eviction_victims, outside_render_distance,
    render_distance_of, request_candidates,
};
