//! Learned scorer over a fixed bank of entity cells.

use super::action::Action;
use super::combiner::EntityCombiner;
use super::config::MemoryConfig;
use super::features::FeatureEmbeddings;
use super::mask::{coref_mask, overwrite_or_ignore_mask};
use super::mlp::Mlp;
use super::state::MemoryState;
use crate::error::{MemoryError, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::ops::log_softmax;
use candle_nn::{linear, Linear, Module, VarBuilder};
use tracing::{info, trace};

/// Additive score given to masked-out slots before normalization.
pub const MASK_PENALTY: f64 = -1e4;

/// Applies `mask` to `scores` and normalizes into log-probabilities.
///
/// Eligible slots keep their score, ineligible ones are replaced by
/// [`MASK_PENALTY`].
pub fn masked_log_softmax(scores: &Tensor, mask: Vec<f32>) -> Result<Tensor> {
    let len = mask.len();
    let mask = Tensor::from_vec(mask, len, scores.device())?.to_dtype(scores.dtype())?;
    let penalty = mask.affine(-MASK_PENALTY, MASK_PENALTY)?;
    let masked = scores.mul(&mask)?.add(&penalty)?;
    Ok(log_softmax(&masked, 0)?)
}

/// Learned scorer and update policy for a fixed bank of entity cells.
#[derive(Debug)]
pub struct FixedMemory {
    config: MemoryConfig,
    query_projector: Linear,
    mem_coref_mlp: Mlp,
    ment_coref_mlp: Option<Mlp>,
    mem_fert_mlp: Mlp,
    ment_fert_mlp: Mlp,
    features: FeatureEmbeddings,
    combiner: EntityCombiner,
    device: Device,
    dtype: DType,
    training: bool,
}

impl FixedMemory {
    /// Builds every learned component under `vb`. All tensors live on `vb`'s device.
    pub fn new(config: MemoryConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let mem_size = config.mem_size();
        let emb_size = config.embedding_size;
        let mlp = |input_size: usize, vb: VarBuilder| {
            Mlp::new(input_size, config.mlp_size, 1, config.mlp_depth, config.dropout, vb)
        };

        let query_projector = linear(config.query_input_size(), mem_size, vb.pp("query_projector"))?;
        let mem_coref_mlp = mlp(3 * mem_size + 2 * emb_size, vb.pp("mem_coref_mlp"))?;
        let ment_coref_mlp = if config.use_last_mention {
            Some(mlp(3 * mem_size, vb.pp("ment_coref_mlp"))?)
        } else {
            None
        };
        let mem_fert_mlp = mlp(mem_size + 2 * emb_size, vb.pp("mem_fert_mlp"))?;
        let ment_fert_mlp = mlp(mem_size, vb.pp("ment_fert_mlp"))?;
        let features = FeatureEmbeddings::new(emb_size, vb.pp("features"))?;
        let combiner = EntityCombiner::new(config.entity_representation, mem_size, vb.pp("mem_rnn"))?;

        info!(
            num_cells = config.num_cells,
            mem_size,
            entity_representation = %config.entity_representation,
            use_last_mention = config.use_last_mention,
            "constructed fixed memory"
        );

        Ok(Self {
            query_projector,
            mem_coref_mlp,
            ment_coref_mlp,
            mem_fert_mlp,
            ment_fert_mlp,
            features,
            combiner,
            device: vb.device().clone(),
            dtype: vb.dtype(),
            training: false,
            config,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn num_cells(&self) -> usize {
        self.config.num_cells
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Float type of the parameters and of every tensor this model creates
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn features(&self) -> &FeatureEmbeddings {
        &self.features
    }

    pub fn combiner(&self) -> &EntityCombiner {
        &self.combiner
    }

    /// Scorer for a memory cell's fertility, input `cell ⧺ distance ⧺ count`
    pub fn mem_fert_mlp(&self) -> &Mlp {
        &self.mem_fert_mlp
    }

    /// Scorer for a mention's fertility, input is the query vector
    pub fn ment_fert_mlp(&self) -> &Mlp {
        &self.ment_fert_mlp
    }

    /// Enables dropout in the scoring MLPs
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Creates an empty memory on this model's device.
    pub fn initialize_memory(&self) -> Result<MemoryState> {
        MemoryState::new(
            self.config.num_cells,
            self.config.mem_size(),
            self.dtype,
            &self.device,
        )
    }

    fn check_cells(&self, entity_counter: &[u32]) -> Result<usize> {
        let num_cells = self.config.num_cells;
        if entity_counter.len() != num_cells {
            return Err(MemoryError::ShapeMismatch {
                expected: num_cells,
                actual: entity_counter.len(),
            });
        }
        Ok(num_cells)
    }

    /// Projects a mention embedding, conditioned on its width and the
    /// previous action, into a `(mem_size,)` query vector.
    pub fn query_vector(&self, mention_emb: &Tensor, width: usize, last_action: Action) -> Result<Tensor> {
        let actual = mention_emb.elem_count();
        if mention_emb.rank() != 1 || actual != self.config.hidden_size {
            return Err(MemoryError::ShapeMismatch {
                expected: self.config.hidden_size,
                actual,
            });
        }
        let input = Tensor::cat(
            &[
                mention_emb,
                &self.features.width_embedding(width)?,
                &self.features.last_action_embedding(last_action)?,
            ],
            0,
        )?;
        let query = self.query_projector.forward(&input.unsqueeze(0)?)?;
        Ok(query.squeeze(0)?)
    }

    /// Log-probability of coreferring with each cell, plus a final slot
    /// for starting a new entity. Output has `num_cells + 1` entries.
    ///
    /// `cells` and `last_mention_vectors` are `(num_cells, mem_size)`,
    /// the feature embeddings `(num_cells, emb)`.
    pub fn coref_or_new_log_prob(
        &self,
        query: &Tensor,
        cells: &Tensor,
        last_mention_vectors: &Tensor,
        entity_counter: &[u32],
        distance_embs: &Tensor,
        count_embs: &Tensor,
    ) -> Result<Tensor> {
        let num_cells = self.check_cells(entity_counter)?;
        let rep_query = query.unsqueeze(0)?.repeat((num_cells, 1))?;

        let pair = Tensor::cat(
            &[cells, &rep_query, &cells.mul(&rep_query)?, distance_embs, count_embs],
            1,
        )?;
        let mut coref_score = self.mem_coref_mlp.forward_t(&pair, self.training)?.squeeze(1)?;

        if let Some(ment_coref_mlp) = &self.ment_coref_mlp {
            let last_pair = Tensor::cat(
                &[
                    last_mention_vectors,
                    &rep_query,
                    &last_mention_vectors.mul(&rep_query)?,
                ],
                1,
            )?;
            let last_score = ment_coref_mlp.forward_t(&last_pair, self.training)?.squeeze(1)?;
            coref_score = coref_score.add(&last_score)?;
        }

        let new_score = Tensor::zeros(1, coref_score.dtype(), coref_score.device())?;
        let scores = Tensor::cat(&[&coref_score, &new_score], 0)?;

        let mut mask = coref_mask(entity_counter);
        mask.push(1.0);
        trace!(?mask, "coref/new mask");
        masked_log_softmax(&scores, mask)
    }

    /// Fertility score of every cell, `(num_cells,)`.
    pub fn memory_fertility(&self, cells: &Tensor, distance_embs: &Tensor, count_embs: &Tensor) -> Result<Tensor> {
        let input = Tensor::cat(&[cells, distance_embs, count_embs], 1)?;
        Ok(self.mem_fert_mlp.forward_t(&input, self.training)?.squeeze(1)?)
    }

    /// Fertility score of a query vector, `(1,)`.
    pub fn mention_fertility(&self, query: &Tensor) -> Result<Tensor> {
        let score = self.ment_fert_mlp.forward_t(&query.unsqueeze(0)?, self.training)?;
        Ok(score.squeeze(0)?)
    }

    /// Log-probability over `{overwrite cell 0..M, ignore}` given that the
    /// mention does not corefer with any cell.
    ///
    /// Low-fertility cells are preferred overwrite targets and low-fertility
    /// mentions are preferred to be ignored.
    pub fn overwrite_or_ignore_log_prob(
        &self,
        query: &Tensor,
        cells: &Tensor,
        entity_counter: &[u32],
        distance_embs: &Tensor,
        count_embs: &Tensor,
    ) -> Result<Tensor> {
        self.check_cells(entity_counter)?;
        let cell_scores = self.memory_fertility(cells, distance_embs, count_embs)?.neg()?;
        let ignore_score = self.mention_fertility(query)?.neg()?;
        let scores = Tensor::cat(&[&cell_scores, &ignore_score], 0)?;

        let mask = overwrite_or_ignore_mask(entity_counter);
        trace!(?mask, "overwrite/ignore mask");
        masked_log_softmax(&scores, mask)
    }

    /// Full decision distribution for the mention at `mention_index`,
    /// laid out like [`full_action_mask`](super::mask::full_action_mask):
    /// `[coref 0..M, overwrite 0..M, ignore]`.
    pub fn action_log_prob(&self, query: &Tensor, state: &MemoryState, mention_index: usize) -> Result<Tensor> {
        let entity_counter = state.entity_counter();
        let num_cells = self.check_cells(entity_counter)?;

        let distance_embs = self
            .features
            .distance_embedding(mention_index, state.last_mention_index())?;
        let count_embs = self.features.count_embedding(entity_counter)?;
        let cells = state.cell_matrix()?;
        let last_mentions = state.last_mention_matrix()?;

        let coref_new = self.coref_or_new_log_prob(
            query,
            &cells,
            &last_mentions,
            entity_counter,
            &distance_embs,
            &count_embs,
        )?;
        let overwrite_ign =
            self.overwrite_or_ignore_log_prob(query, &cells, entity_counter, &distance_embs, &count_embs)?;

        let coref = coref_new.narrow(0, 0, num_cells)?;
        let new_entity = coref_new.narrow(0, num_cells, 1)?;
        let overwrite_ign = overwrite_ign.broadcast_add(&new_entity)?;
        Ok(Tensor::cat(&[&coref, &overwrite_ign], 0)?)
    }
}
