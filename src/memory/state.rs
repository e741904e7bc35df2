use crate::error::{MemoryError, Result};
use candle_core::{DType, Device, Tensor};

/// Per-document memory: one entity vector per cell plus bookkeeping.
///
/// Cells start zeroed and inactive. A cell becomes active on its first
/// write and its mention counter never decreases afterwards.
#[derive(Debug, Clone)]
pub struct MemoryState {
    cells: Vec<Tensor>,
    last_mention_vectors: Vec<Tensor>,
    cell_contexts: Vec<Tensor>,
    entity_counter: Vec<u32>,
    last_mention_index: Vec<usize>,
}

impl MemoryState {
    /// Creates a zeroed memory with every cell inactive
    pub fn new(num_cells: usize, mem_size: usize, dtype: DType, device: &Device) -> Result<Self> {
        let zeros = Tensor::zeros(mem_size, dtype, device)?;
        Ok(Self {
            cells: vec![zeros.clone(); num_cells],
            last_mention_vectors: vec![zeros.clone(); num_cells],
            cell_contexts: vec![zeros; num_cells],
            entity_counter: vec![0; num_cells],
            last_mention_index: vec![0; num_cells],
        })
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Tensor] {
        &self.cells
    }

    pub fn last_mention_vectors(&self) -> &[Tensor] {
        &self.last_mention_vectors
    }

    /// Recurrent cell state, only meaningful for the LSTM combiner
    pub fn cell_contexts(&self) -> &[Tensor] {
        &self.cell_contexts
    }

    pub fn entity_counter(&self) -> &[u32] {
        &self.entity_counter
    }

    pub fn last_mention_index(&self) -> &[usize] {
        &self.last_mention_index
    }

    pub fn is_active(&self, cell: usize) -> bool {
        self.entity_counter.get(cell).is_some_and(|&count| count > 0)
    }

    pub fn active_cells(&self) -> usize {
        self.entity_counter.iter().filter(|&&count| count > 0).count()
    }

    /// Cell vectors stacked into a `(num_cells, mem_size)` matrix
    pub fn cell_matrix(&self) -> Result<Tensor> {
        Ok(Tensor::stack(&self.cells, 0)?)
    }

    pub fn last_mention_matrix(&self) -> Result<Tensor> {
        Ok(Tensor::stack(&self.last_mention_vectors, 0)?)
    }

    /// Stores a new entity representation in `cell` for the mention at
    /// `mention_index` and counts the mention against the cell.
    pub fn write_cell(
        &mut self,
        cell: usize,
        vector: Tensor,
        context: Tensor,
        mention_index: usize,
        mention_vector: Tensor,
    ) -> Result<()> {
        let num_cells = self.num_cells();
        if cell >= num_cells {
            return Err(MemoryError::CellOutOfRange { cell, num_cells });
        }
        self.cells[cell] = vector;
        self.cell_contexts[cell] = context;
        self.last_mention_vectors[cell] = mention_vector;
        self.entity_counter[cell] = self.entity_counter[cell].saturating_add(1);
        self.last_mention_index[cell] = mention_index;
        Ok(())
    }
}
