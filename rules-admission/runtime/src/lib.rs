#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use prometheus_rules_admission_core as core;
pub use prometheus_rules_admission_k8s_api as k8s;

mod admission;
mod args;
mod metrics;

pub use self::{
    admission::{Admission, Error, MUTATE_PATH, VALIDATE_PATH},
    args::Args,
    metrics::ValidationMetrics,
};
