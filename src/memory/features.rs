use super::action::{Action, NUM_ACTION_CATEGORIES};
use super::bucket::{
    count_bucket, distance_bucket, width_bucket, NUM_COUNT_BUCKETS, NUM_DISTANCE_BUCKETS,
    NUM_WIDTH_BUCKETS,
};
use crate::error::{MemoryError, Result};
use candle_core::{Device, Tensor};
use candle_nn::{embedding, Embedding, Module, VarBuilder};

/// Learned embedding tables for the bucketed scalar features.
#[derive(Debug, Clone)]
pub struct FeatureEmbeddings {
    last_action: Embedding,
    distance: Embedding,
    width: Embedding,
    counter: Embedding,
    device: Device,
}

impl FeatureEmbeddings {
    pub fn new(embedding_size: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            last_action: embedding(NUM_ACTION_CATEGORIES, embedding_size, vb.pp("last_action"))?,
            distance: embedding(NUM_DISTANCE_BUCKETS, embedding_size, vb.pp("distance"))?,
            width: embedding(NUM_WIDTH_BUCKETS, embedding_size, vb.pp("width"))?,
            counter: embedding(NUM_COUNT_BUCKETS, embedding_size, vb.pp("counter"))?,
            device: vb.device().clone(),
        })
    }

    fn lookup(&self, table: &Embedding, buckets: Vec<u32>) -> Result<Tensor> {
        let len = buckets.len();
        let ids = Tensor::from_vec(buckets, len, &self.device)?;
        Ok(table.forward(&ids)?)
    }

    /// `(num_cells, emb)` embeddings of the mention gap since each cell's last update.
    pub fn distance_embedding(&self, mention_index: usize, last_mention_index: &[usize]) -> Result<Tensor> {
        let buckets = last_mention_index
            .iter()
            .enumerate()
            .map(|(cell, &last)| {
                mention_index
                    .checked_sub(last)
                    .map(|gap| distance_bucket(gap) as u32)
                    .ok_or(MemoryError::NegativeDistance {
                        cell,
                        mention_index,
                        last_mention_index: last,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        self.lookup(&self.distance, buckets)
    }

    /// `(num_cells, emb)` embeddings of each cell's mention count.
    pub fn count_embedding(&self, entity_counter: &[u32]) -> Result<Tensor> {
        let buckets = entity_counter
            .iter()
            .map(|&count| count_bucket(count as usize) as u32)
            .collect();
        self.lookup(&self.counter, buckets)
    }

    pub fn width_embedding(&self, width: usize) -> Result<Tensor> {
        let emb = self.lookup(&self.width, vec![width_bucket(width) as u32])?;
        Ok(emb.squeeze(0)?)
    }

    pub fn last_action_embedding(&self, action: Action) -> Result<Tensor> {
        let emb = self.lookup(&self.last_action, vec![action.index() as u32])?;
        Ok(emb.squeeze(0)?)
    }

    /// Looks up an action by its code (`c`, `o`, `i`, `<s>`).
    pub fn last_action_embedding_str(&self, action: &str) -> Result<Tensor> {
        self.last_action_embedding(action.parse()?)
    }
}
