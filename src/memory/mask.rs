//! Eligibility masks over the action space.
//!
//! Masks are 1.0 for eligible slots and 0.0 otherwise. The full action space
//! for a mention is laid out as
//! `[coref 0..M, overwrite 0..M, ignore]`.

/// 1.0 for every active cell.
pub fn coref_mask(entity_counter: &[u32]) -> Vec<f32> {
    entity_counter
        .iter()
        .map(|&count| if count > 0 { 1.0 } else { 0.0 })
        .collect()
}

/// Highest-index inactive cell, if any.
pub fn last_unused_cell(entity_counter: &[u32]) -> Option<usize> {
    entity_counter.iter().rposition(|&count| count == 0)
}

/// Mask over `{overwrite cell 0..M, ignore}`.
///
/// While the memory has room only the last unused cell may be written.
/// Once every cell is active any cell may be overwritten, or the mention
/// ignored.
pub fn overwrite_or_ignore_mask(entity_counter: &[u32]) -> Vec<f32> {
    let num_cells = entity_counter.len();
    match last_unused_cell(entity_counter) {
        Some(cell) => {
            let mut mask = vec![0.0; num_cells + 1];
            mask[cell] = 1.0;
            mask
        }
        None => vec![1.0; num_cells + 1],
    }
}

/// `coref_mask` followed by `overwrite_or_ignore_mask`, length `2M + 1`.
pub fn full_action_mask(entity_counter: &[u32]) -> Vec<f32> {
    let mut mask = coref_mask(entity_counter);
    mask.extend(overwrite_or_ignore_mask(entity_counter));
    mask
}
