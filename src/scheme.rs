use kube::core::admission::{AdmissionRequest, AdmissionReview};
use kube::core::{DynamicObject, TypeMeta};
use serde::Deserialize;
use thiserror::Error;

pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";
pub const ADMISSION_V1: &str = "admission.k8s.io/v1";
pub const ADMISSION_V1BETA1: &str = "admission.k8s.io/v1beta1";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse AdmissionReview: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected kind '{0}', expected {ADMISSION_REVIEW_KIND}")]
    Kind(String),
    #[error("unsupported admission API version '{0}'")]
    Version(String),
    #[error("AdmissionReview carries no request")]
    MissingRequest,
    /// The envelope is readable but its request is not; the UID is kept so
    /// the answer can still be matched to the request.
    #[error("could not decode request {uid}: {source}")]
    MalformedRequest {
        types: TypeMeta,
        uid: String,
        source: serde_json::Error,
    },
}

/// Just enough of a review to answer it when the full decode fails.
#[derive(Deserialize)]
struct Envelope {
    #[serde(flatten)]
    types: TypeMeta,
    request: Option<RequestUid>,
}

#[derive(Deserialize)]
struct RequestUid {
    uid: String,
}

/// A review that passed schema checks.
pub struct DecodedReview {
    pub types: TypeMeta,
    pub request: AdmissionRequest<DynamicObject>,
}

/// Admission API versions this webhook understands. Built once at startup
/// and shared read-only by every request.
#[derive(Debug, Clone)]
pub struct Scheme {
    versions: Vec<&'static str>,
}

impl Default for Scheme {
    fn default() -> Self {
        Self {
            versions: vec![ADMISSION_V1, ADMISSION_V1BETA1],
        }
    }
}

impl Scheme {
    pub fn recognizes(&self, types: &TypeMeta) -> Result<(), DecodeError> {
        if types.kind != ADMISSION_REVIEW_KIND {
            return Err(DecodeError::Kind(types.kind.clone()));
        }
        if !self.versions.contains(&types.api_version.as_str()) {
            return Err(DecodeError::Version(types.api_version.clone()));
        }
        Ok(())
    }

    pub fn decode(&self, body: &[u8]) -> Result<DecodedReview, DecodeError> {
        let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(body) {
            Ok(review) => review,
            Err(source) => return Err(self.salvage(body, source)),
        };
        self.recognizes(&review.types)?;

        let types = review.types.clone();
        let request: AdmissionRequest<DynamicObject> = review
            .try_into()
            .map_err(|_| DecodeError::MissingRequest)?;
        Ok(DecodedReview { types, request })
    }

    fn salvage(&self, body: &[u8], source: serde_json::Error) -> DecodeError {
        match serde_json::from_slice::<Envelope>(body) {
            Ok(Envelope {
                types,
                request: Some(RequestUid { uid }),
            }) if self.recognizes(&types).is_ok() => {
                DecodeError::MalformedRequest { types, uid, source }
            }
            _ => DecodeError::Json(source),
        }
    }
}
