use crate::{
    k8s::{
        admission::{
            self, AdmissionResponse, DynamicObject, Request, ResourceId, Review, Status,
            StatusCause, StatusDetails,
        },
        PrometheusRule, Resource,
    },
    ValidationMetrics,
};
use bytes::Bytes;
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Response};
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

mod mutate;
mod validate;


pub const VALIDATE_PATH: &str = "/admission-prometheusrules/validate";
pub const MUTATE_PATH: &str = "/admission-prometheusrules/mutate";

const UNABLE_TO_DESERIALIZE: &str = "Unable to deserialize request";
const UNEXPECTED_RESOURCE: &str = "Unexpected resource kind";
const CANNOT_UNMARSHAL_RULES: &str = "Cannot unmarshal rules from spec";
const RULES_NOT_VALID: &str = "Rules are not valid";

/// Serves the validating and mutating webhooks for `PrometheusRule`
/// resources.
#[derive(Clone, Debug, Default)]
pub struct Admission {
    metrics: ValidationMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[source] BoxError),
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Body = http_body_util::Full<Bytes>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Route {
    Validate,
    Mutate,
}

#[derive(Debug, Error)]
#[error("expected resource to be {expected}, but received {actual}")]
struct UnexpectedResource {
    expected: ResourceId,
    actual: ResourceId,
}

#[derive(Debug, Error)]
enum ObjectError {
    #[error("admission request has no object")]
    Missing,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// === impl Admission ===

impl<B> tower::Service<hyper::Request<B>> for Admission
where
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: hyper::Request<B>) -> Self::Future {
        trace!(method = %req.method(), uri = %req.uri(), "Request");
        let Some(route) = Route::from_path(req.uri().path()) else {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        };

        let admission = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let bytes = body
                .collect()
                .await
                .map_err(|e| Error::Request(e.into()))?
                .to_bytes();
            Ok(admission.serve(route, &parts.headers, &bytes))
        })
    }
}

impl Admission {
    pub fn new(metrics: ValidationMetrics) -> Self {
        Self { metrics }
    }

    fn serve(&self, route: Route, headers: &http::HeaderMap, body: &[u8]) -> Response<Body> {
        if body.is_empty() {
            warn!(path = route.path(), "Request has no body");
            return text_response(http::StatusCode::BAD_REQUEST, "request has no body".into());
        }

        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()));
        if content_type.as_deref() != Some("application/json") {
            warn!(path = route.path(), ?content_type, "Invalid Content-Type");
            return text_response(
                http::StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "invalid Content-Type, want `application/json`".into(),
            );
        }

        debug!(path = route.path(), content = %String::from_utf8_lossy(body), "Received request");
        let review = self.dispatch(route, body);
        match serde_json::to_vec(&review) {
            Ok(bytes) => {
                debug!(content = %String::from_utf8_lossy(&bytes), "Sending response");
                Response::builder()
                    .status(http::StatusCode::OK)
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(bytes))
                    .expect("admission review response must be valid")
            }
            Err(error) => {
                error!(%error, "Cannot serialize response");
                text_response(
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("could not serialize response: {error}"),
                )
            }
        }
    }

    /// Decodes a review and runs the route's admission function on it. The
    /// response echoes the request's envelope version, kind and UID.
    fn dispatch(&self, route: Route, body: &[u8]) -> Review {
        let req = match admission::decode(body) {
            Ok(req) => req,
            Err(error) => {
                info!(%error, "{UNABLE_TO_DESERIALIZE}");
                let rsp = failure(
                    AdmissionResponse::invalid(UNABLE_TO_DESERIALIZE),
                    UNABLE_TO_DESERIALIZE,
                    [error],
                );
                return admission::undecodable(body, rsp);
            }
        };

        let rsp = match route {
            Route::Validate => validate::admit(&self.metrics, &req),
            Route::Mutate => mutate::admit(&req),
        };
        rsp.into_review()
    }
}

// === impl Route ===

impl Route {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            VALIDATE_PATH => Some(Self::Validate),
            MUTATE_PATH => Some(Self::Mutate),
            _ => None,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Self::Validate => VALIDATE_PATH,
            Self::Mutate => MUTATE_PATH,
        }
    }
}

/// Denies `rsp` with one status cause per error, in order.
fn failure<E: fmt::Display>(
    rsp: AdmissionResponse,
    message: &str,
    errors: impl IntoIterator<Item = E>,
) -> AdmissionResponse {
    let causes = errors
        .into_iter()
        .map(|error| StatusCause {
            reason: String::new(),
            message: error.to_string(),
            field: String::new(),
        })
        .collect::<Vec<_>>();
    let name = if causes.is_empty() {
        String::new()
    } else {
        PrometheusRule::plural(&()).into_owned()
    };

    let mut rsp = rsp.deny(message);
    rsp.result = Status::failure(message, "Invalid")
        .with_code(http::StatusCode::UNPROCESSABLE_ENTITY.as_u16())
        .with_details(StatusDetails {
            name,
            group: String::new(),
            kind: String::new(),
            uid: String::new(),
            causes,
            retry_after_seconds: 0,
        });
    rsp
}

fn check_resource(req: &Request) -> Result<(), UnexpectedResource> {
    let expected = ResourceId::of::<PrometheusRule>();
    let actual = ResourceId::requested(req);
    if actual != expected {
        return Err(UnexpectedResource { expected, actual });
    }
    Ok(())
}

/// Returns the object under review along with its decoded spec. A missing or
/// null spec decodes as the default.
fn parse_spec<T>(req: &Request) -> Result<(&DynamicObject, T), ObjectError>
where
    T: DeserializeOwned + Default,
{
    let obj = req.object.as_ref().ok_or(ObjectError::Missing)?;
    let spec = match obj.data.get("spec") {
        None | Some(serde_json::Value::Null) => T::default(),
        Some(spec) => serde_json::from_value(spec.clone())?,
    };
    Ok((obj, spec))
}

fn text_response(status: http::StatusCode, body: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))
        .expect("text response must be valid")
}
