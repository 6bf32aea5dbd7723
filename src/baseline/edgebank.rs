use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{DgError, Result};
use crate::types::Time;

/// How long an observed edge stays in memory.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    /// Every edge ever seen is remembered.
    #[default]
    Unlimited,
    /// Only edges seen inside a trailing window are remembered.
    FixedTimeWindow,
}

impl FromStr for MemoryMode {
    type Err = DgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unlimited" => Ok(MemoryMode::Unlimited),
            "fixed_time_window" => Ok(MemoryMode::FixedTimeWindow),
            other => Err(DgError::invalid(format!("unknown memory mode '{other}'"))),
        }
    }
}

impl fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryMode::Unlimited => f.write_str("unlimited"),
            MemoryMode::FixedTimeWindow => f.write_str("fixed_time_window"),
        }
    }
}

/// Settings for [`EdgeBank`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeBankOptions {
    /// Memory retention policy.
    pub memory_mode: MemoryMode,
    /// Fraction of the observed time span kept in window mode, in `(0, 1]`.
    pub time_window_ratio: f64,
    /// Score returned for remembered edges.
    pub pos_prob: f64,
}

impl Default for EdgeBankOptions {
    fn default() -> Self {
        Self {
            memory_mode: MemoryMode::Unlimited,
            time_window_ratio: 0.15,
            pos_prob: 1.0,
        }
    }
}

impl EdgeBankOptions {
    /// Sets the retention policy.
    pub fn memory_mode(mut self, mode: MemoryMode) -> Self {
        self.memory_mode = mode;
        self
    }

    /// Sets the window ratio used in window mode.
    pub fn time_window_ratio(mut self, ratio: f64) -> Self {
        self.time_window_ratio = ratio;
        self
    }

    /// Sets the score for remembered edges.
    pub fn pos_prob(mut self, prob: f64) -> Self {
        self.pos_prob = prob;
        self
    }
}

/// Memorization baseline for link prediction.
///
/// Predicts `pos_prob` for any `(src, dst)` pair it has seen (inside the
/// current window, in window mode) and 0 otherwise.
#[derive(Clone, Debug)]
pub struct EdgeBank {
    options: EdgeBankOptions,
    memory: FxHashMap<(i64, i64), Time>,
    start_time: f64,
    end_time: f64,
}

impl EdgeBank {
    /// Builds the memory from an initial set of edges.
    pub fn new(src: &[i64], dst: &[i64], ts: &[i64], options: EdgeBankOptions) -> Result<Self> {
        check_inputs(src, dst, ts)?;
        if !(options.time_window_ratio > 0.0 && options.time_window_ratio <= 1.0) {
            return Err(DgError::invalid(format!(
                "time_window_ratio must be in (0, 1], got {}",
                options.time_window_ratio
            )));
        }
        let (min_t, max_t) = min_max(ts);
        let (start, end) = (min_t as f64, max_t as f64);
        let start_time = match options.memory_mode {
            MemoryMode::Unlimited => start,
            MemoryMode::FixedTimeWindow => end - options.time_window_ratio * (end - start),
        };
        let mut bank = Self {
            options,
            memory: FxHashMap::default(),
            start_time,
            end_time: end,
        };
        bank.remember(src, dst, ts);
        Ok(bank)
    }

    /// Active retention policy.
    pub fn memory_mode(&self) -> MemoryMode {
        self.options.memory_mode
    }

    /// Configured window ratio.
    pub fn time_window_ratio(&self) -> f64 {
        self.options.time_window_ratio
    }

    /// Score returned for remembered edges.
    pub fn pos_prob(&self) -> f64 {
        self.options.pos_prob
    }

    /// Lower bound of the memory window.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Latest time observed.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Distinct edges held in memory.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether the memory is empty.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Adds edges and, in window mode, slides the window forward.
    pub fn update_memory(&mut self, src: &[i64], dst: &[i64], ts: &[i64]) -> Result<()> {
        check_inputs(src, dst, ts)?;
        let (_, max_t) = min_max(ts);
        let max_t = max_t as f64;
        if self.options.memory_mode == MemoryMode::FixedTimeWindow && max_t > self.end_time {
            let shift = max_t - self.end_time;
            self.start_time += shift;
            trace!(shift, start = self.start_time, "edgebank.window.slide");
        }
        self.end_time = self.end_time.max(max_t);
        self.remember(src, dst, ts);
        Ok(())
    }

    /// Scores each `(src[i], dst[i])` query pair.
    pub fn predict_link(&self, src: &[i64], dst: &[i64]) -> Result<Vec<f64>> {
        if src.len() != dst.len() {
            return Err(DgError::invalid(format!(
                "src and dst must have the same length, got {}, {}",
                src.len(),
                dst.len()
            )));
        }
        Ok(src
            .iter()
            .zip(dst)
            .map(|(&s, &d)| match self.memory.get(&(s, d)) {
                Some(&seen) if self.in_window(seen) => self.options.pos_prob,
                _ => 0.0,
            })
            .collect())
    }

    fn in_window(&self, seen: Time) -> bool {
        match self.options.memory_mode {
            MemoryMode::Unlimited => true,
            MemoryMode::FixedTimeWindow => seen as f64 >= self.start_time,
        }
    }

    fn remember(&mut self, src: &[i64], dst: &[i64], ts: &[i64]) {
        for ((&s, &d), &t) in src.iter().zip(dst).zip(ts) {
            let seen = self.memory.entry((s, d)).or_insert(t);
            *seen = (*seen).max(t);
        }
    }
}

fn check_inputs(src: &[i64], dst: &[i64], ts: &[i64]) -> Result<()> {
    if src.len() != dst.len() || src.len() != ts.len() {
        return Err(DgError::invalid(format!(
            "src, dst, and ts must have the same length, got {}, {}, {}",
            src.len(),
            dst.len(),
            ts.len()
        )));
    }
    if src.is_empty() {
        return Err(DgError::invalid(
            "src, dst, and ts must have at least one element",
        ));
    }
    Ok(())
}

fn min_max(ts: &[i64]) -> (i64, i64) {
    ts.iter()
        .fold((i64::MAX, i64::MIN), |(lo, hi), &t| (lo.min(t), hi.max(t)))
}
