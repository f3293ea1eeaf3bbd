//! Layer count and downsampling stride planning.
//!
//! Every layer of the quad-tree divides the data volume by four: a split
//! produces four children, each covering a quarter of the parent's index
//! area, and byte size is taken to be proportional to area.

use crate::error::{QuadTreeError, Result};

/// Number of layers needed so a bottom-layer chunk is no larger than
/// `max_chunk_size`. The root counts as layer 1, so a dataset that already
/// fits yields a single-node tree.
pub fn num_layers(original_file_size: f64, max_chunk_size: f64) -> Result<u32> {
    check_sizes(original_file_size, max_chunk_size)?;

    let mut i = 0;
    let mut current = original_file_size;
    while current > max_chunk_size {
        i += 1;
        current = original_file_size / 4f64.powi(i);
    }
    Ok(i as u32 + 1)
}

/// Target point count per chunk: the full point count scaled by the ratio of
/// chunk size to file size.
pub fn point_budget(total_points: usize, original_file_size: f64, max_chunk_size: f64) -> Result<f64> {
    check_sizes(original_file_size, max_chunk_size)?;
    Ok(total_points as f64 * (max_chunk_size / original_file_size))
}

/// Smallest stride `s >= 1` with `(x / s) * (y / s) <= point_budget`.
///
/// A non-positive or non-finite budget, or a grid without extent, gets
/// stride 1: the chunk is stored at full resolution.
pub fn stride_for(x_size: usize, y_size: usize, point_budget: f64) -> usize {
    if !(point_budget.is_finite() && point_budget > 0.0) {
        log::warn!("point budget {point_budget} is infeasible, storing chunk without downsampling");
        return 1;
    }
    let area = x_size as f64 * y_size as f64;
    if area <= point_budget {
        return 1;
    }

    let fits = |s: usize| area <= point_budget * (s as f64) * (s as f64);
    let mut stride = ((area / point_budget).sqrt().ceil() as usize).max(1);
    // Correct rounding in the square root.
    while stride > 1 && fits(stride - 1) {
        stride -= 1;
    }
    while !fits(stride) {
        stride += 1;
    }
    stride
}

fn check_sizes(original_file_size: f64, max_chunk_size: f64) -> Result<()> {
    if !(original_file_size.is_finite() && original_file_size > 0.0) {
        return Err(QuadTreeError::BudgetInfeasible(format!(
            "original file size must be positive, got {original_file_size}"
        )));
    }
    if !(max_chunk_size.is_finite() && max_chunk_size > 0.0) {
        return Err(QuadTreeError::BudgetInfeasible(format!(
            "max chunk size must be positive, got {max_chunk_size}"
        )));
    }
    Ok(())
}
