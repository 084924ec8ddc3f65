//! Authoritative game simulation: enemies, per-player game state, input
//! handling, and the room lifecycle. Nothing in here performs I/O; the
//! server crate drives rooms from its tick loop and routes the resulting
//! events and messages.

pub mod enemy;
pub mod game_data;
pub mod input;
pub mod replay;
pub mod room;
