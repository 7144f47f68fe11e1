//! Metrics definitions for the tabular store clients.

use shared::metrics_defs::{MetricDef, MetricType};

pub const STORE_REQUESTS: MetricDef = MetricDef {
    name: "store.requests",
    metric_type: MetricType::Counter,
    description: "Requests sent to the spreadsheet API. Tagged with op.",
};

pub const STORE_ERRORS: MetricDef = MetricDef {
    name: "store.errors",
    metric_type: MetricType::Counter,
    description: "Spreadsheet API requests that failed. Tagged with op.",
};

pub const STORE_REQUEST_DURATION: MetricDef = MetricDef {
    name: "store.request.duration",
    metric_type: MetricType::Histogram,
    description: "Spreadsheet API request duration in seconds. Tagged with op.",
};

pub const ALL_METRICS: &[MetricDef] = &[STORE_REQUESTS, STORE_ERRORS, STORE_REQUEST_DURATION];
