use super::{
    check_resource, failure, parse_spec, CANNOT_UNMARSHAL_RULES, RULES_NOT_VALID,
    UNEXPECTED_RESOURCE,
};
use crate::{
    core::validate_rule,
    k8s::{
        admission::{AdmissionResponse, Request},
        PrometheusRuleSpec, ResourceExt,
    },
    ValidationMetrics,
};
use tracing::{debug, info, warn};

/// Rejects rule objects that Prometheus would refuse to load.
pub(super) fn admit(metrics: &ValidationMetrics, req: &Request) -> AdmissionResponse {
    metrics.triggered();
    debug!(uid = %req.uid, "Validating PrometheusRule");
    let rsp = AdmissionResponse::from(req);

    if let Err(error) = check_resource(req) {
        warn!(%error);
        metrics.rejected();
        return failure(rsp, UNEXPECTED_RESOURCE, [error]);
    }

    let (obj, spec) = match parse_spec::<PrometheusRuleSpec>(req) {
        Ok(parsed) => parsed,
        Err(error) => {
            info!(%error, "{CANNOT_UNMARSHAL_RULES}");
            metrics.rejected();
            return failure(rsp, CANNOT_UNMARSHAL_RULES, [error]);
        }
    };

    let errors = validate_rule(&spec);
    if !errors.is_empty() {
        let ns = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        debug!(%ns, %name, ?spec, "Invalid rule");
        for error in &errors {
            info!(%error, %ns, %name, "Invalid rule");
        }
        metrics.rejected();
        return failure(rsp, RULES_NOT_VALID, errors);
    }

    rsp
}
