use super::{check_resource, failure, CANNOT_UNMARSHAL_RULES, UNEXPECTED_RESOURCE};
use crate::{
    core::{generate_patches, VALIDATED_ANNOTATION},
    k8s::{
        admission::{AdmissionResponse, Request},
        ObjectMeta,
    },
};
use json_patch::{jsonptr::PointerBuf, AddOperation, Patch, PatchOperation};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
enum SpecError {
    #[error("admission request has no object")]
    MissingObject,

    #[error("rule object has no spec")]
    MissingSpec,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Admits every rule object, stringifying non-string label and annotation
/// values and marking the object as validated.
pub(super) fn admit(req: &Request) -> AdmissionResponse {
    debug!(uid = %req.uid, "Mutating PrometheusRule");

    if let Err(error) = check_resource(req) {
        warn!(%error);
        return failure(AdmissionResponse::from(req), UNEXPECTED_RESOURCE, [error]);
    }

    let ops = match patch(req) {
        Ok(ops) => ops,
        Err(error) => {
            info!(%error, "{CANNOT_UNMARSHAL_RULES}");
            return failure(AdmissionResponse::from(req), CANNOT_UNMARSHAL_RULES, [error]);
        }
    };

    match AdmissionResponse::from(req).with_patch(Patch(ops)) {
        Ok(rsp) => rsp,
        Err(error) => {
            error!(%error, "{CANNOT_UNMARSHAL_RULES}");
            failure(AdmissionResponse::from(req), CANNOT_UNMARSHAL_RULES, [error])
        }
    }
}

/// An absent or null object or spec is an error.
fn patch(req: &Request) -> Result<Vec<PatchOperation>, SpecError> {
    let obj = req.object.as_ref().ok_or(SpecError::MissingObject)?;
    let spec = obj
        .data
        .get("spec")
        .filter(|spec| !spec.is_null())
        .ok_or(SpecError::MissingSpec)?;

    let mut ops = generate_patches(spec)?;
    ops.push(annotate(&obj.metadata));
    Ok(ops)
}

fn annotate(metadata: &ObjectMeta) -> PatchOperation {
    let has_annotations = metadata
        .annotations
        .as_ref()
        .is_some_and(|annotations| !annotations.is_empty());

    let op = if has_annotations {
        AddOperation {
            path: PointerBuf::from_tokens(["metadata", "annotations", VALIDATED_ANNOTATION]),
            value: Value::String("true".to_string()),
        }
    } else {
        AddOperation {
            path: PointerBuf::from_tokens(["metadata", "annotations"]),
            value: serde_json::json!({ VALIDATED_ANNOTATION: "true" }),
        }
    };
    PatchOperation::Add(op)
}
