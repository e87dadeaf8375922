//! Trace sinks for accepted chain states.
//!
//! The [`TraceSink`] trait defines how accepted values leave the sampler.
//! The sampler only ever calls [`append`](TraceSink::append); what a sink
//! does with the series (keep them in memory, stream them to disk, ship
//! them elsewhere) is its own business and the persisted format is out of
//! scope here.
//!
//! The default implementation is [`MemoryTrace`], a map of named series
//! behind a read-write lock, shared freely across threads via `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// One traced value: a scalar or a vector sample.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TraceValue {
    /// A scalar sample.
    Scalar(f64),
    /// A vector sample (e.g. a hyperparameter or latent vector).
    Vector(Vec<f64>),
}

/// Trait for receiving accepted chain values.
///
/// Implementations must be `Send + Sync`; independent chains may share one
/// sink from parallel threads.
pub trait TraceSink: Send + Sync {
    /// Appends one value to the named series.
    fn append(&self, name: &str, value: TraceValue);
}

/// In-memory trace store (the default).
///
/// A thin wrapper around `RwLock<HashMap<String, Vec<TraceValue>>>`.
#[derive(Debug, Default)]
pub struct MemoryTrace {
    series: RwLock<HashMap<String, Vec<TraceValue>>>,
}

impl MemoryTrace {
    /// Creates a new, empty trace store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared handle to a new, empty trace store.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns a copy of the named series, empty if the name is unknown.
    #[must_use]
    pub fn series(&self, name: &str) -> Vec<TraceValue> {
        self.series.read().get(name).cloned().unwrap_or_default()
    }

    /// Number of samples recorded under `name`.
    #[must_use]
    pub fn len(&self, name: &str) -> usize {
        self.series.read().get(name).map_or(0, Vec::len)
    }

    /// Returns `true` if nothing has been recorded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    /// All series names seen so far.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.series.read().keys().cloned().collect()
    }
}

impl TraceSink for MemoryTrace {
    fn append(&self, name: &str, value: TraceValue) {
        self.series
            .write()
            .entry(name.to_owned())
            .or_default()
            .push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let trace = MemoryTrace::new();
        trace.append("amp", TraceValue::Scalar(1.0));
        trace.append("amp", TraceValue::Scalar(2.0));
        trace.append("latent", TraceValue::Vector(vec![0.1, 0.2]));
        assert_eq!(trace.len("amp"), 2);
        assert_eq!(trace.len("latent"), 1);
        assert_eq!(trace.len("unknown"), 0);
        assert_eq!(
            trace.series("amp"),
            vec![TraceValue::Scalar(1.0), TraceValue::Scalar(2.0)]
        );
    }
}
