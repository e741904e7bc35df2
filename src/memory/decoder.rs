//! Per-document decision loop over the fixed memory.
//!
//! Mentions are processed in order. Each step scores the full action space
//! against the current memory, picks an action (gold, arg-max or sampled)
//! and applies it before moving to the next mention.

use super::action::Action;
use super::fixed_memory::FixedMemory;
use super::mask::full_action_mask;
use super::state::MemoryState;
use crate::error::{MemoryError, Result};
use candle_core::{DType, Tensor};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Token span of a mention, `end` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub start: usize,
    pub end: usize,
}

impl Mention {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> Result<usize> {
        self.end
            .checked_sub(self.start)
            .ok_or(MemoryError::InvalidMention {
                start: self.start,
                end: self.end,
            })
    }
}

/// Gold decision for one mention. `cell` is ignored for [`Action::Ignore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldAction {
    pub cell: usize,
    pub action: Action,
}

impl GoldAction {
    pub fn new(cell: usize, action: Action) -> Self {
        Self { cell, action }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Follow the gold actions and accumulate their negative log-likelihood
    TeacherForced,
    /// Take the most probable action
    Greedy,
    /// Sample from the decision distribution
    Sample { seed: u64 },
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub mention_index: usize,
    pub action: Action,
    /// Target cell; `None` for ignore
    pub cell: Option<usize>,
    /// Distribution the action was chosen from, `2 * num_cells + 1` entries
    pub log_prob: Tensor,
}

#[derive(Debug)]
pub struct DocumentOutput {
    pub decisions: Vec<Decision>,
    pub memory: MemoryState,
    /// Summed negative log-likelihood of the gold actions (teacher forcing only)
    pub loss: Option<Tensor>,
}

/// Position of `(action, cell)` in the full action layout.
pub fn action_slot(action: Action, cell: usize, num_cells: usize) -> Result<usize> {
    let in_range = |cell: usize| {
        if cell < num_cells {
            Ok(cell)
        } else {
            Err(MemoryError::CellOutOfRange { cell, num_cells })
        }
    };
    match action {
        Action::Coref => in_range(cell),
        Action::Overwrite => Ok(num_cells + in_range(cell)?),
        Action::Ignore => Ok(2 * num_cells),
        Action::Start => Err(MemoryError::UnknownAction(action.to_string())),
    }
}

/// Inverse of [`action_slot`].
pub fn slot_action(slot: usize, num_cells: usize) -> Result<(Action, Option<usize>)> {
    match slot {
        s if s < num_cells => Ok((Action::Coref, Some(s))),
        s if s < 2 * num_cells => Ok((Action::Overwrite, Some(s - num_cells))),
        s if s == 2 * num_cells => Ok((Action::Ignore, None)),
        s => Err(MemoryError::ShapeMismatch {
            expected: 2 * num_cells + 1,
            actual: s + 1,
        }),
    }
}

impl FixedMemory {
    /// Executes a decision for the mention at `mention_index` whose query
    /// vector is `query`.
    ///
    /// Coref folds the query into the cell through the entity combiner,
    /// overwrite replaces the cell and resets its recurrent context, and
    /// ignore leaves the memory untouched.
    pub fn apply_action(
        &self,
        state: &mut MemoryState,
        action: Action,
        cell: Option<usize>,
        query: &Tensor,
        mention_index: usize,
    ) -> Result<()> {
        let num_cells = state.num_cells();
        let target = || -> Result<usize> {
            let cell = cell.ok_or(MemoryError::IneligibleAction {
                action: action.to_string(),
                cell: num_cells,
                mention_index,
            })?;
            if cell < num_cells {
                Ok(cell)
            } else {
                Err(MemoryError::CellOutOfRange { cell, num_cells })
            }
        };

        match action {
            Action::Coref => {
                let cell = target()?;
                let (vector, context) = self.combiner().combine(
                    &state.cells()[cell],
                    &state.cell_contexts()[cell],
                    query,
                )?;
                state.write_cell(cell, vector, context, mention_index, query.clone())
            }
            Action::Overwrite => {
                let cell = target()?;
                state.write_cell(cell, query.clone(), query.zeros_like()?, mention_index, query.clone())
            }
            Action::Ignore => Ok(()),
            Action::Start => Err(MemoryError::UnknownAction(action.to_string())),
        }
    }

    /// Runs the memory over one document.
    ///
    /// `mention_embs` is `(num_mentions, hidden_size)` and aligned with
    /// `mentions`. `gold` is required for [`DecodeMode::TeacherForced`] and
    /// ignored otherwise.
    pub fn process_document(
        &self,
        mention_embs: &Tensor,
        mentions: &[Mention],
        gold: Option<&[GoldAction]>,
        mode: DecodeMode,
    ) -> Result<DocumentOutput> {
        let (num_mentions, hidden_size) = mention_embs.dims2()?;
        if num_mentions != mentions.len() {
            return Err(MemoryError::ShapeMismatch {
                expected: mentions.len(),
                actual: num_mentions,
            });
        }
        if hidden_size != self.config().hidden_size {
            return Err(MemoryError::ShapeMismatch {
                expected: self.config().hidden_size,
                actual: hidden_size,
            });
        }
        let gold = match (mode, gold) {
            (DecodeMode::TeacherForced, Some(gold)) if gold.len() == num_mentions => Some(gold),
            (DecodeMode::TeacherForced, _) => return Err(MemoryError::MissingGoldActions),
            _ => None,
        };
        let mut rng = match mode {
            DecodeMode::Sample { seed } => Some(StdRng::seed_from_u64(seed)),
            _ => None,
        };

        let num_cells = self.num_cells();
        let mut state = self.initialize_memory()?;
        let mut last_action = Action::Start;
        let mut decisions = Vec::with_capacity(num_mentions);
        let mut gold_log_probs = Vec::new();

        for (mention_index, mention) in mentions.iter().enumerate() {
            let mention_emb = mention_embs.get(mention_index)?;
            let query = self.query_vector(&mention_emb, mention.width()?, last_action)?;
            let log_prob = self.action_log_prob(&query, &state, mention_index)?;

            let slot = if let Some(gold) = gold {
                let GoldAction { cell, action } = gold[mention_index];
                let slot = action_slot(action, cell, num_cells)?;
                if full_action_mask(state.entity_counter())[slot] == 0.0 {
                    return Err(MemoryError::IneligibleAction {
                        action: action.to_string(),
                        cell,
                        mention_index,
                    });
                }
                gold_log_probs.push(log_prob.get(slot)?);
                slot
            } else if let Some(rng) = rng.as_mut() {
                let probs = log_prob.exp()?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
                WeightedIndex::new(&probs)?.sample(rng)
            } else {
                log_prob.argmax(0)?.to_scalar::<u32>()? as usize
            };

            let (action, cell) = slot_action(slot, num_cells)?;
            debug!(mention_index, %action, ?cell, "memory decision");
            self.apply_action(&mut state, action, cell, &query, mention_index)?;

            decisions.push(Decision {
                mention_index,
                action,
                cell,
                log_prob,
            });
            last_action = action;
        }

        let loss = match gold {
            Some(_) if gold_log_probs.is_empty() => {
                Some(Tensor::zeros((), self.dtype(), self.device())?)
            }
            Some(_) => Some(Tensor::stack(&gold_log_probs, 0)?.sum_all()?.neg()?),
            None => None,
        };

        Ok(DocumentOutput {
            decisions,
            memory: state,
            loss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::config::{EntityRepresentation, MemoryConfig};
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn memory(varmap: &VarMap, representation: EntityRepresentation) -> FixedMemory {
        let config = MemoryConfig {
            num_cells: 2,
            hidden_size: 6,
            mlp_size: 5,
            mem_size: Some(4),
            embedding_size: 3,
            entity_representation: representation,
            ..MemoryConfig::default()
        };
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        FixedMemory::new(config, vb).unwrap()
    }

    fn document(len: usize) -> (Tensor, Vec<Mention>) {
        let embs = Tensor::randn(0f32, 1.0, (len, 6), &Device::Cpu).unwrap();
        let mentions = (0..len).map(|i| Mention::new(2 * i, 2 * i + 1)).collect();
        (embs, mentions)
    }

    #[test]
    fn test_slot_layout_round_trip() -> Result<()> {
        for slot in 0..5 {
            let (action, cell) = slot_action(slot, 2)?;
            assert_eq!(action_slot(action, cell.unwrap_or(0), 2)?, slot);
        }
        assert!(slot_action(5, 2).is_err());
        assert!(action_slot(Action::Start, 0, 2).is_err());
        assert!(matches!(
            action_slot(Action::Coref, 2, 2),
            Err(MemoryError::CellOutOfRange { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_mention_width() {
        assert_eq!(Mention::new(3, 5).width().unwrap(), 2);
        assert!(matches!(
            Mention::new(5, 3).width(),
            Err(MemoryError::InvalidMention { start: 5, end: 3 })
        ));
    }

    #[test]
    fn test_teacher_forced_updates_memory() -> Result<()> {
        let varmap = VarMap::new();
        let memory = memory(&varmap, EntityRepresentation::Max);
        let (embs, mentions) = document(4);
        let gold = [
            GoldAction::new(1, Action::Overwrite),
            GoldAction::new(0, Action::Overwrite),
            GoldAction::new(1, Action::Coref),
            GoldAction::new(0, Action::Ignore),
        ];

        let output = memory.process_document(&embs, &mentions, Some(&gold), DecodeMode::TeacherForced)?;
        assert_eq!(output.decisions.len(), 4);
        assert_eq!(output.memory.entity_counter(), &[1, 2]);
        assert_eq!(output.memory.last_mention_index(), &[1, 2]);
        assert_eq!(output.decisions[3].action, Action::Ignore);
        assert_eq!(output.decisions[3].cell, None);

        let loss = output.loss.unwrap().to_scalar::<f32>()?;
        assert!(loss.is_finite());
        assert!(loss >= 0.0);
        Ok(())
    }

    #[test]
    fn test_teacher_forcing_rejects_masked_gold() {
        let varmap = VarMap::new();
        let memory = memory(&varmap, EntityRepresentation::Max);
        let (embs, mentions) = document(1);
        let gold = [GoldAction::new(0, Action::Coref)];
        let err = memory
            .process_document(&embs, &mentions, Some(&gold), DecodeMode::TeacherForced)
            .unwrap_err();
        assert!(matches!(err, MemoryError::IneligibleAction { mention_index: 0, .. }));
    }

    #[test]
    fn test_teacher_forcing_requires_gold() {
        let varmap = VarMap::new();
        let memory = memory(&varmap, EntityRepresentation::Max);
        let (embs, mentions) = document(2);
        let gold = [GoldAction::new(1, Action::Overwrite)];
        assert!(matches!(
            memory.process_document(&embs, &mentions, Some(&gold), DecodeMode::TeacherForced),
            Err(MemoryError::MissingGoldActions)
        ));
        assert!(matches!(
            memory.process_document(&embs, &mentions, None, DecodeMode::TeacherForced),
            Err(MemoryError::MissingGoldActions)
        ));
    }

    #[test]
    fn test_greedy_decisions_are_eligible() -> Result<()> {
        for representation in [
            EntityRepresentation::Max,
            EntityRepresentation::Lstm,
            EntityRepresentation::Gru,
        ] {
            let varmap = VarMap::new();
            let memory = memory(&varmap, representation);
            let (embs, mentions) = document(6);
            let output = memory.process_document(&embs, &mentions, None, DecodeMode::Greedy)?;

            // First mention can only fill the last empty cell.
            assert_eq!(output.decisions[0].action, Action::Overwrite);
            assert_eq!(output.decisions[0].cell, Some(1));
            assert!(output.loss.is_none());

            let total: u32 = output.memory.entity_counter().iter().sum();
            let written = output
                .decisions
                .iter()
                .filter(|d| d.action != Action::Ignore)
                .count();
            assert_eq!(total as usize, written);
        }
        Ok(())
    }

    #[test]
    fn test_sampling_is_reproducible() -> Result<()> {
        let varmap = VarMap::new();
        let memory = memory(&varmap, EntityRepresentation::Max);
        let (embs, mentions) = document(5);

        let first = memory.process_document(&embs, &mentions, None, DecodeMode::Sample { seed: 7 })?;
        let second = memory.process_document(&embs, &mentions, None, DecodeMode::Sample { seed: 7 })?;
        let actions = |output: &DocumentOutput| {
            output
                .decisions
                .iter()
                .map(|d| (d.action, d.cell))
                .collect::<Vec<_>>()
        };
        assert_eq!(actions(&first), actions(&second));
        Ok(())
    }

    #[test]
    fn test_overwrite_resets_context() -> Result<()> {
        let varmap = VarMap::new();
        let memory = memory(&varmap, EntityRepresentation::Lstm);
        let mut state = memory.initialize_memory()?;
        let query = Tensor::ones(4, DType::F32, &Device::Cpu)?;

        memory.apply_action(&mut state, Action::Overwrite, Some(1), &query, 0)?;
        memory.apply_action(&mut state, Action::Coref, Some(1), &query, 1)?;
        assert_eq!(state.entity_counter(), &[0, 2]);

        memory.apply_action(&mut state, Action::Overwrite, Some(1), &query, 2)?;
        assert_eq!(state.cell_contexts()[1].to_vec1::<f32>()?, vec![0.0; 4]);
        assert_eq!(state.cells()[1].to_vec1::<f32>()?, vec![1.0; 4]);
        assert_eq!(state.entity_counter(), &[0, 3]);

        memory.apply_action(&mut state, Action::Ignore, None, &query, 3)?;
        assert_eq!(state.last_mention_index(), &[0, 2]);
        assert!(memory
            .apply_action(&mut state, Action::Coref, None, &query, 4)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_empty_document_has_zero_loss() -> Result<()> {
        let varmap = VarMap::new();
        let memory = memory(&varmap, EntityRepresentation::Max);
        let embs = Tensor::zeros((0, 6), DType::F32, &Device::Cpu)?;
        let gold: [GoldAction; 0] = [];

        let output = memory.process_document(&embs, &[], Some(&gold), DecodeMode::TeacherForced)?;
        assert!(output.decisions.is_empty());
        assert_eq!(output.loss.unwrap().to_scalar::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_double_precision_model() -> Result<()> {
        for representation in [EntityRepresentation::Max, EntityRepresentation::Lstm] {
            let varmap = VarMap::new();
            let config = MemoryConfig {
                num_cells: 2,
                hidden_size: 6,
                mlp_size: 5,
                mem_size: Some(4),
                embedding_size: 3,
                entity_representation: representation,
                ..MemoryConfig::default()
            };
            let vb = VarBuilder::from_varmap(&varmap, DType::F64, &Device::Cpu);
            let memory = FixedMemory::new(config, vb)?;
            assert_eq!(memory.dtype(), DType::F64);

            let embs = Tensor::randn(0f64, 1.0, (3, 6), &Device::Cpu)?;
            let mentions: Vec<Mention> = (0..3).map(|i| Mention::new(i, i + 1)).collect();

            let greedy = memory.process_document(&embs, &mentions, None, DecodeMode::Greedy)?;
            assert_eq!(greedy.decisions.len(), 3);
            assert_eq!(greedy.memory.cells()[0].dtype(), DType::F64);

            let sampled =
                memory.process_document(&embs, &mentions, None, DecodeMode::Sample { seed: 3 })?;
            assert_eq!(sampled.decisions.len(), 3);

            let gold = [
                GoldAction::new(1, Action::Overwrite),
                GoldAction::new(1, Action::Coref),
                GoldAction::new(0, Action::Overwrite),
            ];
            let forced =
                memory.process_document(&embs, &mentions, Some(&gold), DecodeMode::TeacherForced)?;
            let loss = forced.loss.unwrap();
            assert_eq!(loss.dtype(), DType::F64);
            assert!(loss.to_scalar::<f64>()?.is_finite());
        }
        Ok(())
    }
}
