//! Fallback template similarity
//!
//! A byte/bit-level heuristic used whenever the vendor matcher is disabled or
//! unavailable. It knows nothing about minutiae, only about how many bits and
//! bytes two templates share. The weights and the length cutoff decide
//! accept/reject outcomes for templates already enrolled, so they live in
//! `constants::similarity` and must not drift.

use crate::constants::similarity::{
    BIT_PATTERN_WEIGHT, CORRELATION_WEIGHT, HAMMING_WEIGHT, MAX_LENGTH_RATIO, SIZE_PENALTY_SCALE,
};

/// Score two templates on a 0-100 scale
pub fn similarity(a: &[u8], b: &[u8]) -> u32 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    if a.len() != b.len() {
        return unequal_length_similarity(a, b);
    }

    let hamming = hamming_similarity(a, b);
    let correlation = byte_correlation(a, b);
    let bit_pattern = bit_agreement(a, b);

    let combined =
        hamming * HAMMING_WEIGHT + correlation * CORRELATION_WEIGHT + bit_pattern * BIT_PATTERN_WEIGHT;
    truncate_score(combined)
}

fn unequal_length_similarity(a: &[u8], b: &[u8]) -> u32 {
    let min_len = a.len().min(b.len());
    let max_len = a.len().max(b.len());

    // Very different sizes are almost certainly different fingers
    if max_len as f64 / min_len as f64 > MAX_LENGTH_RATIO {
        return 0;
    }

    let common = hamming_similarity(&a[..min_len], &b[..min_len]);
    let penalty = (max_len - min_len) as f64 / max_len as f64 * SIZE_PENALTY_SCALE;
    truncate_score((common - penalty).max(0.0))
}

/// 100 minus the percentage of differing bits
fn hamming_similarity(a: &[u8], b: &[u8]) -> f64 {
    let distance: u32 = a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum();
    let total_bits = (a.len() * 8) as f64;
    (100.0 - (distance as f64 / total_bits) * 100.0).max(0.0)
}

/// Mean per-byte closeness: 100 when equal, scaled by absolute difference otherwise
fn byte_correlation(a: &[u8], b: &[u8]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            if x == y {
                100.0
            } else {
                let diff = (x as f64 - y as f64).abs();
                (100.0 - (diff / 255.0) * 100.0).max(0.0)
            }
        })
        .sum();
    sum / a.len() as f64
}

/// Percentage of bit positions holding the same value
fn bit_agreement(a: &[u8], b: &[u8]) -> f64 {
    let matches: u32 = a.iter().zip(b).map(|(x, y)| (!(x ^ y)).count_ones()).sum();
    let total = (a.len() * 8) as f64;
    (matches as f64 / total) * 100.0
}

fn truncate_score(value: f64) -> u32 {
    value.clamp(0.0, 100.0) as u32
}
