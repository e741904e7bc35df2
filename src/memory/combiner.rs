//! Entity-state combiners: how a coreferent mention updates its cell.

use super::config::EntityRepresentation;
use crate::error::Result;
use candle_core::Tensor;
use candle_nn::rnn::{gru, lstm, GRUConfig, GRUState, LSTMConfig, LSTMState, GRU, LSTM, RNN};
use candle_nn::VarBuilder;

/// Chosen once at construction and applied at every coref update.
#[derive(Debug, Clone)]
pub enum EntityCombiner {
    /// Elementwise max of the cell and the mention
    Max,
    /// Mention is the input, cell vector the hidden state, context the cell state
    Lstm(LSTM),
    /// Mention is the input, cell vector the hidden state
    Gru(GRU),
}

impl EntityCombiner {
    pub fn new(representation: EntityRepresentation, mem_size: usize, vb: VarBuilder) -> Result<Self> {
        let combiner = match representation {
            EntityRepresentation::Max => Self::Max,
            EntityRepresentation::Lstm => {
                Self::Lstm(lstm(mem_size, mem_size, LSTMConfig::default(), vb)?)
            }
            EntityRepresentation::Gru => {
                Self::Gru(gru(mem_size, mem_size, GRUConfig::default(), vb)?)
            }
        };
        Ok(combiner)
    }

    pub fn representation(&self) -> EntityRepresentation {
        match self {
            Self::Max => EntityRepresentation::Max,
            Self::Lstm(_) => EntityRepresentation::Lstm,
            Self::Gru(_) => EntityRepresentation::Gru,
        }
    }

    /// Folds `mention` into `cell`, returning the new cell vector and context.
    ///
    /// All inputs are `(mem_size,)` vectors.
    pub fn combine(&self, cell: &Tensor, context: &Tensor, mention: &Tensor) -> Result<(Tensor, Tensor)> {
        match self {
            Self::Max => Ok((cell.maximum(mention)?, context.clone())),
            Self::Lstm(rnn) => {
                let state = LSTMState {
                    h: cell.unsqueeze(0)?,
                    c: context.unsqueeze(0)?,
                };
                let next = rnn.step(&mention.unsqueeze(0)?, &state)?;
                Ok((next.h.squeeze(0)?, next.c.squeeze(0)?))
            }
            Self::Gru(rnn) => {
                let state = GRUState { h: cell.unsqueeze(0)? };
                let next = rnn.step(&mention.unsqueeze(0)?, &state)?;
                Ok((next.h.squeeze(0)?, context.clone()))
            }
        }
    }
}
