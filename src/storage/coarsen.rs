use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, Zip};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{DgError, Result};
use crate::events::{EdgeEvent, Event, NodeEvent};
use crate::timedelta::TimeDelta;
use crate::types::{NodeId, Time};

/// How feature vectors that land in the same coarse bin are combined.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    /// Element-wise sum.
    #[default]
    Sum,
    /// Element-wise mean over featured events.
    Mean,
    /// Element-wise maximum.
    Max,
    /// Element-wise minimum.
    Min,
    /// Value of the latest event in the bin.
    Last,
}

impl AggFunc {
    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Max => "max",
            AggFunc::Min => "min",
            AggFunc::Last => "last",
        }
    }
}

impl FromStr for AggFunc {
    type Err = DgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggFunc::Sum),
            "mean" => Ok(AggFunc::Mean),
            "max" => Ok(AggFunc::Max),
            "min" => Ok(AggFunc::Min),
            "last" => Ok(AggFunc::Last),
            other => Err(DgError::invalid(format!(
                "unknown aggregation function '{other}'"
            ))),
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exact mapping from source timestamps to coarse bins: `floor(t * num / den)`.
///
/// `num / den` is the source delta over the target delta, reduced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct BinScale {
    num: i128,
    den: i128,
}

impl BinScale {
    pub fn new(source: &TimeDelta, target: &TimeDelta) -> Result<Self> {
        let (Some(src), Some(tgt)) = (source.total_nanos(), target.total_nanos()) else {
            return Err(DgError::invalid(format!(
                "temporal coarsening requires physical time deltas, got {source} -> {target}"
            )));
        };
        if tgt < src {
            return Err(DgError::invalid(format!(
                "cannot coarsen {source} into finer {target}"
            )));
        }
        let g = gcd(src, tgt);
        let too_wide = || DgError::invalid(format!("time deltas {source} -> {target} are too wide"));
        Ok(Self {
            num: i128::try_from(src / g).map_err(|_| too_wide())?,
            den: i128::try_from(tgt / g).map_err(|_| too_wide())?,
        })
    }

    /// Coarse bin of source time `t`.
    pub fn bin(&self, t: Time) -> Result<Time> {
        let overflow = || DgError::invalid(format!("timestamp {t} overflows while coarsening"));
        let scaled = i128::from(t).checked_mul(self.num).ok_or_else(overflow)?;
        Time::try_from(scaled.div_euclid(self.den)).map_err(|_| overflow())
    }

    /// Whether every bin spans a whole number of source units.
    pub fn is_integral(&self) -> bool {
        self.num == 1
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
enum BinKey {
    Node(NodeId),
    Edge(NodeId, NodeId),
}

struct Accum {
    agg: AggFunc,
    value: Option<ArrayD<f32>>,
    count: usize,
}

impl Accum {
    fn new(agg: AggFunc) -> Self {
        Self {
            agg,
            value: None,
            count: 0,
        }
    }

    fn push(&mut self, features: Option<&ArrayD<f32>>) {
        let Some(features) = features else {
            return;
        };
        self.count += 1;
        let Some(acc) = self.value.as_mut() else {
            self.value = Some(features.clone());
            return;
        };
        match self.agg {
            AggFunc::Sum | AggFunc::Mean => *acc += features,
            AggFunc::Max => Zip::from(acc).and(features).for_each(|a, &b| *a = a.max(b)),
            AggFunc::Min => Zip::from(acc).and(features).for_each(|a, &b| *a = a.min(b)),
            AggFunc::Last => acc.assign(features),
        }
    }

    fn finish(self) -> Option<ArrayD<f32>> {
        let count = self.count;
        match (self.agg, self.value) {
            (AggFunc::Mean, Some(sum)) => Some(sum / count as f32),
            (_, value) => value,
        }
    }
}

/// Re-buckets time-ordered `events` into coarse bins.
///
/// An event at `t` moves to `scale.bin(t)`. Events of the same node or
/// `(src, dst)` pair inside one bin collapse into a single event whose
/// features are combined with `agg`. Output keeps bin order, then first
/// appearance inside the bin.
pub(crate) fn coarsen_events(events: &[Event], scale: BinScale, agg: AggFunc) -> Result<Vec<Event>> {
    let mut bins: BTreeMap<Time, (Vec<BinKey>, FxHashMap<BinKey, Accum>)> = BTreeMap::new();
    for event in events {
        let bin = scale.bin(event.time())?;
        let key = match event {
            Event::Node(ev) => BinKey::Node(ev.node_id),
            Event::Edge(ev) => BinKey::Edge(ev.src, ev.dst),
        };
        let (order, accums) = bins.entry(bin).or_default();
        let acc = accums.entry(key).or_insert_with(|| {
            order.push(key);
            Accum::new(agg)
        });
        acc.push(event.features());
    }

    let mut out = Vec::with_capacity(events.len());
    for (time, (order, mut accums)) in bins {
        for key in order {
            let features = accums.remove(&key).and_then(Accum::finish);
            out.push(match key {
                BinKey::Node(node_id) => Event::Node(NodeEvent {
                    time,
                    node_id,
                    features,
                }),
                BinKey::Edge(src, dst) => Event::Edge(EdgeEvent {
                    time,
                    src,
                    dst,
                    features,
                }),
            });
        }
    }
    Ok(out)
}
