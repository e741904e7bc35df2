//! Differentiable fixed-size entity memory for neural coreference.
//!
//! Mentions are compared against a bank of entity cells and assigned to one
//! of them (coref), written into a cell (overwrite), or dropped (ignore).
//! Tensors and learned parameters come from candle; the caller owns the
//! [`VarMap`](candle_nn::VarMap) and the per-document [`MemoryState`].

pub mod error;
pub mod memory;

pub use error::{MemoryError, Result};
pub use memory::{
    Action, DecodeMode, EntityRepresentation, FixedMemory, GoldAction, MemoryConfig,
    MemoryState, Mention,
};
