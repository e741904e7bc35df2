use crate::error::{MemoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a cell's vector absorbs a newly coreferent mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityRepresentation {
    Max,
    Lstm,
    Gru,
}

impl FromStr for EntityRepresentation {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max" => Ok(Self::Max),
            "lstm" => Ok(Self::Lstm),
            "gru" => Ok(Self::Gru),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown entity representation: {other}"
            ))),
        }
    }
}

impl fmt::Display for EntityRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Max => "max",
            Self::Lstm => "lstm",
            Self::Gru => "gru",
        };
        f.write_str(name)
    }
}

/// Configuration for the fixed memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of entity cells
    pub num_cells: usize,
    /// Width of incoming mention embeddings
    pub hidden_size: usize,
    /// Hidden width of the scoring MLPs
    pub mlp_size: usize,
    /// Number of hidden layers in the scoring MLPs
    pub mlp_depth: usize,
    /// Width of cell vectors; falls back to `hidden_size`
    pub mem_size: Option<usize>,
    /// Width of every feature embedding
    pub embedding_size: usize,
    pub entity_representation: EntityRepresentation,
    /// Add the last-mention scorer to the cell coref score
    pub use_last_mention: bool,
    /// Dropout applied after each MLP hidden layer in training mode
    pub dropout: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            num_cells: 10,
            hidden_size: 300,
            mlp_size: 200,
            mlp_depth: 1,
            mem_size: None,
            embedding_size: 20,
            entity_representation: EntityRepresentation::Max,
            use_last_mention: false,
            dropout: 0.0,
        }
    }
}

impl MemoryConfig {
    pub fn mem_size(&self) -> usize {
        self.mem_size.unwrap_or(self.hidden_size)
    }

    /// Input width of the query projector: mention, width and last-action embeddings.
    pub fn query_input_size(&self) -> usize {
        self.hidden_size + 2 * self.embedding_size
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("num_cells", self.num_cells),
            ("hidden_size", self.hidden_size),
            ("mlp_size", self.mlp_size),
            ("mem_size", self.mem_size()),
            ("embedding_size", self.embedding_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(MemoryError::InvalidConfig(format!("{name} must be positive")));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(MemoryError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}
