#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod duration;
mod patch;
mod validate;

pub use self::{
    duration::PromDuration,
    patch::generate_patches,
    validate::{validate_rule, ExprError, GroupError, RuleError, Violation},
};

/// Annotation set on every rule object that passes through the mutating
/// webhook.
pub const VALIDATED_ANNOTATION: &str = "prometheus-operator-validated";
