use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status, route.",
};

pub const AUTH_FAILURES: MetricDef = MetricDef {
    name: "auth.failures",
    metric_type: MetricType::Counter,
    description: "Requests rejected for missing or insufficient credentials. Tagged with route.",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUEST_DURATION, AUTH_FAILURES];
