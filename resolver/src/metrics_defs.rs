//! Metrics definitions for the resolution pipeline.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RESULT_CACHE_HIT: MetricDef = MetricDef {
    name: "resolver.cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of resolutions served from the result cache",
};

pub const RESULT_CACHE_MISS: MetricDef = MetricDef {
    name: "resolver.cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of resolutions that missed the result cache",
};

pub const RESULT_CACHE_ERROR: MetricDef = MetricDef {
    name: "resolver.cache.error",
    metric_type: MetricType::Counter,
    description: "Number of result store operations that failed and degraded to a miss",
};

pub const COALESCED_WAITS: MetricDef = MetricDef {
    name: "resolver.coalesced.waits",
    metric_type: MetricType::Counter,
    description: "Number of callers that attached to an already in-flight resolution",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RESULT_CACHE_HIT,
    RESULT_CACHE_MISS,
    RESULT_CACHE_ERROR,
    COALESCED_WAITS,
];
