//! Fixed-capacity entity memory for coreference resolution.

pub mod action;
pub mod bucket;
pub mod combiner;
pub mod config;
pub mod decoder;
pub mod features;
pub mod fixed_memory;
pub mod mask;
pub mod mlp;
pub mod state;

pub use action::Action;
pub use config::{EntityRepresentation, MemoryConfig};
pub use decoder::{DecodeMode, Decision, DocumentOutput, GoldAction, Mention};
pub use fixed_memory::FixedMemory;
pub use state::MemoryState;
