//! Vector clock value type and causality comparison

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Causal relationship of one clock to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockOrdering {
    /// Identical histories
    Equal,
    /// Left side incorporates everything in the right side and more
    Dominates,
    /// Right side incorporates everything in the left side and more
    Dominated,
    /// Neither history contains the other
    Concurrent,
}

impl ClockOrdering {
    /// The ordering seen from the other side of the comparison.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Dominates => Self::Dominated,
            Self::Dominated => Self::Dominates,
            other => other,
        }
    }
}

/// Per-actor counter map. Absent actors count as zero.
///
/// Zero counters are never stored, so two clocks are `==` exactly when
/// [`VectorClock::compare`] returns [`ClockOrdering::Equal`]. Every
/// transformation returns a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    /// The all-zero clock
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Counter for `actor`, zero when absent
    pub fn get(&self, actor: &str) -> u64 {
        self.0.get(actor).copied().unwrap_or(0)
    }

    /// Whether every counter is zero
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the non-zero counters in actor order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(actor, counter)| (actor.as_str(), *counter))
    }

    /// Compare over the union of actors present in either clock.
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut greater = false;
        let mut less = false;

        for actor in self.0.keys().chain(other.0.keys()) {
            match self.get(actor).cmp(&other.get(actor)) {
                Ordering::Greater => greater = true,
                Ordering::Less => less = true,
                Ordering::Equal => {}
            }
            if greater && less {
                return ClockOrdering::Concurrent;
            }
        }

        match (greater, less) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Dominates,
            (false, true) => ClockOrdering::Dominated,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Strictly newer than `other`
    pub fn dominates(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::Dominates
    }

    /// Per-actor maximum of both clocks
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (actor, counter) in &other.0 {
            let entry = merged.entry(actor.clone()).or_insert(0);
            *entry = (*entry).max(*counter);
        }
        Self(merged)
    }

    /// Copy with `actor`'s counter incremented by one.
    ///
    /// Called by the authoring device before submission; the server never
    /// advances a clock on a client's behalf.
    #[must_use]
    pub fn advance(&self, actor: &str) -> Self {
        let mut advanced = self.0.clone();
        let counter = advanced.entry(actor.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
        Self(advanced)
    }

    /// Decode a clock from stored or submitted JSON text.
    ///
    /// Malformed input decodes as the zero clock.
    pub fn from_json_str(text: &str) -> Self {
        serde_json::from_str::<Value>(text)
            .map_or_else(|_| Self::new(), |value| Self::from_value(&value))
    }

    /// Decode a clock from a JSON value.
    ///
    /// Accepts a flat `{actor: n}` object, or a string holding one. Anything
    /// else, including a single negative or non-integer counter, is the zero
    /// clock.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::from_object(value),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(inner @ Value::Object(_)) => Self::from_object(&inner),
                _ => Self::new(),
            },
            _ => Self::new(),
        }
    }

    fn from_object(value: &Value) -> Self {
        let Some(entries) = value.as_object() else {
            return Self::new();
        };

        let mut counters = BTreeMap::new();
        for (actor, counter) in entries {
            let Some(counter) = counter.as_u64() else {
                return Self::new();
            };
            if counter > 0 {
                counters.insert(actor.clone(), counter);
            }
        }
        Self(counters)
    }

    /// Serialize to the flat JSON text stored alongside a record
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl<A: Into<String>> FromIterator<(A, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (A, u64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(actor, counter)| (actor.into(), counter))
                .filter(|(_, counter)| *counter > 0)
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for VectorClock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (actor, counter)) in self.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{actor}:{counter}")?;
        }
        f.write_str("}")
    }
}
