use serde::{Deserialize, Serialize};
use std::fmt;

/// The stable, small integer identifier the dictionary assigns to a metric name.
///
/// Ids are allocated by the persistence collaborator and are never reused or
/// renumbered, so any id embedded in an already-written blob stays resolvable.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct MetricId(pub u32);

impl MetricId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the metric dictionary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetricEntry {
    pub name: String,
    pub id: MetricId,
}

impl MetricEntry {
    pub fn new(name: impl Into<String>, id: MetricId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}
