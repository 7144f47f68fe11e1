use shared::metrics_defs::{MetricDef, MetricType};

pub const PUBLISH_REQUESTS: MetricDef = MetricDef {
    name: "publish.requests",
    metric_type: MetricType::Counter,
    description: "Completed publish requests. Tagged with main_action.",
};

pub const PUBLISH_ERRORS: MetricDef = MetricDef {
    name: "publish.errors",
    metric_type: MetricType::Counter,
    description: "Failed publish requests. Tagged with kind.",
};

pub const PUBLISH_DURATION: MetricDef = MetricDef {
    name: "publish.duration",
    metric_type: MetricType::Histogram,
    description: "Publish duration in seconds, including time spent waiting on the key lock",
};

pub const PROCESS_ACTIONS: MetricDef = MetricDef {
    name: "publish.process_actions",
    metric_type: MetricType::Counter,
    description: "Process rows touched by publishes. Tagged with action.",
};

pub const HEADER_EXTENSIONS: MetricDef = MetricDef {
    name: "schema.columns_added",
    metric_type: MetricType::Counter,
    description: "Columns appended to a header row",
};

pub const ALL_METRICS: &[MetricDef] = &[
    PUBLISH_REQUESTS,
    PUBLISH_ERRORS,
    PUBLISH_DURATION,
    PROCESS_ACTIONS,
    HEADER_EXTENSIONS,
];
