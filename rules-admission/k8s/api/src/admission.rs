//! Admission review envelopes exchanged with the Kubernetes API server.
//!
//! Envelopes are decoded into `kube`'s admission types. Decoding also checks
//! the review against the registered envelope versions, so that an unknown
//! envelope is reported as a [`DecodeError`] rather than silently admitted.

pub use kube::core::admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, ConvertAdmissionReviewError, Operation,
    SerializePatchError, META_API_VERSION_V1, META_API_VERSION_V1BETA1, META_KIND,
};
pub use kube::core::{
    response::{StatusCause, StatusDetails},
    DynamicObject, Status, TypeMeta,
};
use std::fmt;
use thiserror::Error;

pub type Review = AdmissionReview<DynamicObject>;
pub type Request = AdmissionRequest<DynamicObject>;

/// Envelope versions the decoder accepts.
pub const API_VERSIONS: [&str; 2] = [META_API_VERSION_V1, META_API_VERSION_V1BETA1];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("no kind {kind:?} is registered for version {api_version:?}")]
    Unregistered { api_version: String, kind: String },

    #[error("admission review has no request")]
    MissingRequest(#[from] ConvertAdmissionReviewError),
}

/// The resource triple a request targets, compared without the derived
/// `apiVersion` that `kube` keeps alongside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceId {
    pub group: String,
    pub version: String,
    pub resource: String,
}

/// Decodes an admission review envelope of a registered version.
pub fn decode(bytes: &[u8]) -> Result<Request, DecodeError> {
    let review: Review = serde_json::from_slice(bytes)?;

    let TypeMeta { api_version, kind } = &review.types;
    if kind != META_KIND || !API_VERSIONS.contains(&api_version.as_str()) {
        return Err(DecodeError::Unregistered {
            api_version: api_version.clone(),
            kind: kind.clone(),
        });
    }

    Ok(review.try_into()?)
}

/// Wraps a response for a body that could not be decoded, echoing whatever
/// envelope fields are present in it. Missing fields are left empty.
pub fn undecodable(bytes: &[u8], mut rsp: AdmissionResponse) -> Review {
    let value = serde_json::from_slice::<serde_json::Value>(bytes).unwrap_or_default();
    let field = |ptr: &str| {
        value
            .pointer(ptr)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    rsp.types = TypeMeta {
        api_version: field("/apiVersion"),
        kind: field("/kind"),
    };
    rsp.uid = field("/request/uid");
    rsp.into_review()
}

// === impl ResourceId ===

impl ResourceId {
    /// The resource triple of a statically-typed Kubernetes resource.
    pub fn of<K>() -> Self
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            resource: K::plural(&()).into_owned(),
        }
    }

    pub fn requested<T: kube::Resource>(req: &AdmissionRequest<T>) -> Self {
        Self {
            group: req.resource.group.clone(),
            version: req.resource.version.clone(),
            resource: req.resource.resource.clone(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}, Resource={}",
            self.group, self.version, self.resource
        )
    }
}
