//! Coverage log parsing.
//!
//! The toolchain's annotated report carries one counter per line as the
//! final whitespace-separated token. Lines that do not end in an integer are
//! headers or source echoes and are skipped. Counters too large for an
//! `i64` saturate at `i64::MAX` (or `i64::MIN`) instead of being dropped.

use crate::result::{HdlcovError, HdlcovResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Extract the trailing integer of every conforming line
#[must_use]
pub fn parse_coverage_text(text: &str) -> Vec<i64> {
    text.lines()
        .filter_map(|line| line.split_whitespace().last())
        .filter_map(parse_counter)
        .collect()
}

fn parse_counter(token: &str) -> Option<i64> {
    if let Ok(n) = token.parse::<i64>() {
        return Some(n);
    }
    let (negative, digits) = match token.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let integral = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
    integral.then_some(if negative { i64::MIN } else { i64::MAX })
}

/// Read and parse a coverage log file
pub fn parse_coverage_log(path: &Path) -> HdlcovResult<Vec<i64>> {
    let bytes = std::fs::read(path).map_err(|e| HdlcovError::io(path, e))?;
    let counters = parse_coverage_text(&String::from_utf8_lossy(&bytes));
    tracing::debug!(path = %path.display(), counters = counters.len(), "parsed coverage log");
    Ok(counters)
}

/// Aggregate view over a counter sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Number of counters
    pub points: usize,
    /// Counters greater than zero
    pub hit: usize,
    /// Counters equal to zero
    pub missed: usize,
    /// Sum of all counters
    pub total: i64,
}

impl CoverageSummary {
    /// Summarize a counter sequence
    #[must_use]
    pub fn from_counters(counters: &[i64]) -> Self {
        let hit = counters.iter().filter(|&&c| c > 0).count();
        Self {
            points: counters.len(),
            hit,
            missed: counters.iter().filter(|&&c| c == 0).count(),
            total: counters.iter().fold(0i64, |acc, &c| acc.saturating_add(c)),
        }
    }

    /// Fraction of counters that were hit, 0.0 for an empty log
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        if self.points == 0 {
            0.0
        } else {
            self.hit as f64 / self.points as f64
        }
    }
}
