#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod admission;
pub mod prometheus_rule;

pub use self::{
    admission::ResourceId,
    prometheus_rule::{PrometheusRule, PrometheusRuleSpec, Rule, RuleGroup},
};
pub use k8s_openapi::apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString};
pub use kube::{Resource, ResourceExt};
