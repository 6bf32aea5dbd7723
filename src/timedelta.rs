//! Unit-aware time granularity.
//!
//! A [`TimeDelta`] describes how far apart two consecutive timestamps of a
//! graph are, or how wide a batch window should be. Physical units convert
//! through a fixed nanosecond table (months are 30 days, years 365 days).
//! The ordered unit means "count events" and never converts to a physical
//! unit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DgError, Result};

const NS_PER_US: u64 = 1_000;
const NS_PER_MS: u64 = 1_000 * NS_PER_US;
const NS_PER_S: u64 = 1_000 * NS_PER_MS;
const NS_PER_MIN: u64 = 60 * NS_PER_S;
const NS_PER_HOUR: u64 = 60 * NS_PER_MIN;
const NS_PER_DAY: u64 = 24 * NS_PER_HOUR;
const NS_PER_WEEK: u64 = 7 * NS_PER_DAY;
const NS_PER_MONTH: u64 = 30 * NS_PER_DAY;
const NS_PER_YEAR: u64 = 365 * NS_PER_DAY;

/// Granularity unit of a [`TimeDelta`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Year (`Y`), 365 days.
    Year,
    /// Month (`M`), 30 days.
    Month,
    /// Week (`W`).
    Week,
    /// Day (`D`).
    Day,
    /// Hour (`h`).
    Hour,
    /// Minute (`m`).
    Minute,
    /// Second (`s`).
    Second,
    /// Millisecond (`ms`).
    Millisecond,
    /// Microsecond (`us`).
    Microsecond,
    /// Nanosecond (`ns`).
    Nanosecond,
    /// Event order (`r`); unit-less.
    Ordered,
}

impl TimeUnit {
    /// Every physical unit, coarsest first.
    pub const PHYSICAL: [TimeUnit; 10] = [
        TimeUnit::Year,
        TimeUnit::Month,
        TimeUnit::Week,
        TimeUnit::Day,
        TimeUnit::Hour,
        TimeUnit::Minute,
        TimeUnit::Second,
        TimeUnit::Millisecond,
        TimeUnit::Microsecond,
        TimeUnit::Nanosecond,
    ];

    /// Length of one unit in nanoseconds, `None` for [`TimeUnit::Ordered`].
    pub fn nanos(self) -> Option<u64> {
        match self {
            TimeUnit::Year => Some(NS_PER_YEAR),
            TimeUnit::Month => Some(NS_PER_MONTH),
            TimeUnit::Week => Some(NS_PER_WEEK),
            TimeUnit::Day => Some(NS_PER_DAY),
            TimeUnit::Hour => Some(NS_PER_HOUR),
            TimeUnit::Minute => Some(NS_PER_MIN),
            TimeUnit::Second => Some(NS_PER_S),
            TimeUnit::Millisecond => Some(NS_PER_MS),
            TimeUnit::Microsecond => Some(NS_PER_US),
            TimeUnit::Nanosecond => Some(1),
            TimeUnit::Ordered => None,
        }
    }

    /// Short symbol used in configuration and display.
    pub fn symbol(self) -> &'static str {
        match self {
            TimeUnit::Year => "Y",
            TimeUnit::Month => "M",
            TimeUnit::Week => "W",
            TimeUnit::Day => "D",
            TimeUnit::Hour => "h",
            TimeUnit::Minute => "m",
            TimeUnit::Second => "s",
            TimeUnit::Millisecond => "ms",
            TimeUnit::Microsecond => "us",
            TimeUnit::Nanosecond => "ns",
            TimeUnit::Ordered => "r",
        }
    }

    /// Whether this is the event-order unit.
    #[inline]
    pub fn is_ordered(self) -> bool {
        matches!(self, TimeUnit::Ordered)
    }
}

impl FromStr for TimeUnit {
    type Err = DgError;

    fn from_str(s: &str) -> Result<Self> {
        // Case matters: `M` is month and `m` is minute.
        match s {
            "Y" => Ok(TimeUnit::Year),
            "M" => Ok(TimeUnit::Month),
            "W" => Ok(TimeUnit::Week),
            "D" => Ok(TimeUnit::Day),
            "h" => Ok(TimeUnit::Hour),
            "m" => Ok(TimeUnit::Minute),
            "s" => Ok(TimeUnit::Second),
            "ms" => Ok(TimeUnit::Millisecond),
            "us" => Ok(TimeUnit::Microsecond),
            "ns" => Ok(TimeUnit::Nanosecond),
            "r" => Ok(TimeUnit::Ordered),
            other => Err(DgError::invalid(format!("unknown time unit '{other}'"))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A positive multiple of a [`TimeUnit`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TimeDelta {
    unit: TimeUnit,
    value: u64,
}

impl TimeDelta {
    /// Creates a delta of `value` units.
    ///
    /// `value` must be positive, and exactly 1 for the ordered unit.
    pub fn new(unit: TimeUnit, value: u64) -> Result<Self> {
        if value == 0 {
            return Err(DgError::invalid(format!(
                "time delta value must be positive, got {value}"
            )));
        }
        if unit.is_ordered() && value != 1 {
            return Err(DgError::invalid(format!(
                "ordered time delta only supports value 1, got {value}"
            )));
        }
        Ok(Self { unit, value })
    }

    /// Parses the unit symbol then calls [`TimeDelta::new`].
    pub fn parse(unit: &str, value: u64) -> Result<Self> {
        Self::new(unit.parse()?, value)
    }

    /// The event-order delta.
    pub const fn ordered() -> Self {
        Self {
            unit: TimeUnit::Ordered,
            value: 1,
        }
    }

    /// Granularity unit.
    #[inline]
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Multiple of the unit.
    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Total span in nanoseconds, `None` when ordered.
    pub fn total_nanos(&self) -> Option<u128> {
        self.unit
            .nanos()
            .map(|ns| u128::from(ns) * u128::from(self.value))
    }

    /// Whether this delta counts events rather than physical time.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.unit.is_ordered()
    }

    /// Returns how many `other` fit into `self`.
    ///
    /// Fails when exactly one side is ordered; two ordered deltas convert to 1.
    pub fn convert(&self, other: &TimeDelta) -> Result<f64> {
        match (self.unit.nanos(), other.unit.nanos()) {
            (Some(lhs), Some(rhs)) => {
                let num = self.value as f64 * lhs as f64;
                let den = other.value as f64 * rhs as f64;
                Ok(num / den)
            }
            (None, None) => Ok(1.0),
            _ => Err(DgError::invalid(format!(
                "cannot convert between ordered and physical time deltas ({self} vs {other})"
            ))),
        }
    }

    /// Converts into a bare unit of value 1.
    pub fn convert_unit(&self, unit: TimeUnit) -> Result<f64> {
        self.convert(&TimeDelta::new(unit, 1)?)
    }

    /// Whether `self` spans strictly more time than `other`.
    pub fn is_coarser_than(&self, other: &TimeDelta) -> Result<bool> {
        Ok(self.convert(other)? > 1.0)
    }
}

impl Default for TimeDelta {
    fn default() -> Self {
        Self::ordered()
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ordered() {
            write!(f, "TimeDelta(unit='{}')", self.unit)
        } else {
            write!(f, "TimeDelta(unit='{}', value={})", self.unit, self.value)
        }
    }
}
