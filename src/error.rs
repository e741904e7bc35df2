//! Error types for the entity memory.

use thiserror::Error;

/// Result type for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Negative distance: mention {mention_index} precedes last update {last_mention_index} of cell {cell}")]
    NegativeDistance {
        cell: usize,
        mention_index: usize,
        last_mention_index: usize,
    },
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("Invalid mention span ({start}, {end})")]
    InvalidMention { start: usize, end: usize },
    #[error("Action {action} on cell {cell} is not eligible at mention {mention_index}")]
    IneligibleAction {
        action: String,
        cell: usize,
        mention_index: usize,
    },
    #[error("Teacher forcing requires one gold action per mention")]
    MissingGoldActions,
    #[error("Cell {cell} out of range for memory with {num_cells} cells")]
    CellOutOfRange { cell: usize, num_cells: usize },
    #[error("Sampling error: {0}")]
    Sampling(#[from] rand::distributions::WeightedError),
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}
