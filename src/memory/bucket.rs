//! Bucketing of unbounded magnitudes into embedding-table rows.
//!
//! Every bucket function is paired with the size of the table it indexes;
//! changing a range means changing the constant next to it.

/// Largest bucket produced by [`distance_bucket`].
pub const MAX_DISTANCE_BUCKET: usize = 10;
/// Rows in the distance embedding table. Row 0 is never produced.
pub const NUM_DISTANCE_BUCKETS: usize = MAX_DISTANCE_BUCKET + 1;

/// Largest bucket produced by [`count_bucket`].
pub const MAX_COUNT_BUCKET: usize = 10;
pub const NUM_COUNT_BUCKETS: usize = MAX_COUNT_BUCKET + 1;

/// Widths at or above this share one bucket.
pub const MAX_WIDTH_BUCKET: usize = 29;
pub const NUM_WIDTH_BUCKETS: usize = MAX_WIDTH_BUCKET + 1;

/// Log-scale buckets past the identity range.
fn log_bucket(value: usize) -> usize {
    match value {
        0..=7 => 6,
        8..=15 => 7,
        16..=31 => 8,
        32..=63 => 9,
        _ => 10,
    }
}

/// Buckets the number of mentions since a cell was last updated.
pub fn distance_bucket(distance: usize) -> usize {
    if distance < 5 {
        distance + 1
    } else {
        log_bucket(distance)
    }
}

/// Buckets the number of mentions assigned to a cell.
///
/// A count of exactly 5 maps to itself.
pub fn count_bucket(count: usize) -> usize {
    if count <= 5 {
        count
    } else {
        log_bucket(count)
    }
}

pub fn width_bucket(width: usize) -> usize {
    width.min(MAX_WIDTH_BUCKET)
}
