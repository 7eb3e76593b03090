//! Metrics definitions for the document store protocol.

use shared::metrics_defs::{MetricDef, MetricType};

pub const STORE_FETCH_FAILURES: MetricDef = MetricDef {
    name: "store.fetch.failures",
    metric_type: MetricType::Counter,
    description: "Document fetches that failed with a transport, timeout or status error",
};

pub const STORE_REPLACE_FAILURES: MetricDef = MetricDef {
    name: "store.replace.failures",
    metric_type: MetricType::Counter,
    description: "Whole-document writes rejected by the store or lost in transit",
};

pub const STORE_MALFORMED_BODIES: MetricDef = MetricDef {
    name: "store.fetch.malformed",
    metric_type: MetricType::Counter,
    description: "Fetched documents whose body was not JSON and were read as empty",
};

pub const WRITE_ATTEMPTS: MetricDef = MetricDef {
    name: "write.attempts",
    metric_type: MetricType::Counter,
    description: "Read-modify-write attempts started. Tagged with document.",
};

pub const WRITE_EXHAUSTED: MetricDef = MetricDef {
    name: "write.exhausted",
    metric_type: MetricType::Counter,
    description: "Writes that gave up after the last retry. Tagged with document.",
};

pub const WRITE_DURATION: MetricDef = MetricDef {
    name: "write.duration",
    metric_type: MetricType::Histogram,
    description: "Time from first fetch to final outcome of a write in seconds",
};

pub const SHARD_ENTRIES: MetricDef = MetricDef {
    name: "shard.entries",
    metric_type: MetricType::Gauge,
    description: "Entry count last observed for a shard. Tagged with document.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    STORE_FETCH_FAILURES,
    STORE_REPLACE_FAILURES,
    STORE_MALFORMED_BODIES,
    WRITE_ATTEMPTS,
    WRITE_EXHAUSTED,
    WRITE_DURATION,
    SHARD_ENTRIES,
];
