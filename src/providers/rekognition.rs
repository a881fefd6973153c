//! AWS Rekognition `CompareFaces` over its JSON API.
//!
//! Requests are signed with [`super::sigv4`] and sent with `reqwest`; the
//! reply body deserializes straight into [`CompareFacesResponse`]. Service
//! errors carry their code in `__type` (sometimes prefixed with a
//! namespace and `#`) or in the `x-amzn-ErrorType` header. Codes that mean
//! "this image is unusable" become [`FaceServiceError::Rejected`]; every
//! other failure is a provider error.

use super::sigv4::{Credentials, Signer};
use crate::error::PassportError;
use crate::verify::{
    CompareFacesRequest, CompareFacesResponse, FaceComparisonService, FaceServiceError,
};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const PROVIDER: &str = "rekognition";
const TARGET: &str = "RekognitionService.CompareFaces";
const CONTENT_TYPE_AMZ_JSON: &str = "application/x-amz-json-1.1";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Error codes meaning the service could not use one of the images.
const REJECTION_CODES: &[&str] = &[
    "InvalidParameterException",
    "InvalidImageFormatException",
    "ImageTooLargeException",
];

/// Rekognition `CompareFaces` client.
#[derive(Debug, Clone)]
pub struct RekognitionClient {
    http: reqwest::Client,
    signer: Signer,
    endpoint: reqwest::Url,
}

impl RekognitionClient {
    /// Client for `region`, optionally against a custom `endpoint`.
    pub fn new(
        credentials: Credentials,
        region: &str,
        endpoint: Option<&str>,
    ) -> Result<Self, PassportError> {
        let endpoint = match endpoint {
            Some(url) => url.to_string(),
            None => format!("https://rekognition.{region}.amazonaws.com/"),
        };
        let endpoint = reqwest::Url::parse(&endpoint).map_err(|e| {
            PassportError::InvalidConfig(format!("invalid face endpoint '{endpoint}': {e}"))
        })?;
        if endpoint.host_str().is_none() {
            return Err(PassportError::InvalidConfig(format!(
                "face endpoint '{endpoint}' has no host"
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            signer: Signer::new(credentials, region, PROVIDER),
            endpoint,
        })
    }

    /// Credentials from the environment, region from `region` or
    /// `AWS_REGION` or `us-east-1`.
    pub fn from_env(region: Option<&str>, endpoint: Option<&str>) -> Result<Self, PassportError> {
        let region = region
            .map(str::to_string)
            .or_else(|| std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty()))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        Self::new(Credentials::from_env()?, &region, endpoint)
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn signed_headers(&self, body: &[u8]) -> Result<HeaderMap, PassportError> {
        let host = self.host_header();
        let base = [
            ("content-type", CONTENT_TYPE_AMZ_JSON),
            ("host", host.as_str()),
            ("x-amz-target", TARGET),
        ];
        let signing = self
            .signer
            .sign("POST", self.endpoint.path(), "", &base, body, Utc::now())?;

        let mut headers = HeaderMap::new();
        for (name, value) in base
            .iter()
            .filter(|(name, _)| *name != "host")
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .chain(signing)
        {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PassportError::Internal(format!("bad header name: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| PassportError::Internal(format!("bad header value: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// `"com.amazonaws.rekognition#InvalidParameterException"` → `"InvalidParameterException"`.
fn error_code(raw: &str) -> &str {
    let code = raw.rsplit('#').next().unwrap_or(raw);
    code.split(':').next().unwrap_or(code)
}

fn classify_failure(status: u16, header_type: Option<&str>, body: &str) -> FaceServiceError {
    let parsed: Option<ServiceError> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|e| e.kind.as_deref())
        .or(header_type)
        .map(error_code)
        .unwrap_or("UnknownError")
        .to_string();
    let message = parsed
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string());

    if REJECTION_CODES.contains(&code.as_str()) {
        FaceServiceError::Rejected { code, message }
    } else {
        FaceServiceError::Other(PassportError::upstream(
            PROVIDER,
            Some(status),
            format!("{code}: {message}"),
        ))
    }
}

#[async_trait]
impl FaceComparisonService for RekognitionClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn compare_faces(
        &self,
        request: CompareFacesRequest<'_>,
    ) -> Result<CompareFacesResponse, FaceServiceError> {
        let b64 = base64::engine::general_purpose::STANDARD;
        let body = serde_json::to_vec(&json!({
            "SourceImage": { "Bytes": b64.encode(request.source) },
            "TargetImage": { "Bytes": b64.encode(request.target) },
            "SimilarityThreshold": request.similarity_threshold,
        }))
        .map_err(|e| PassportError::Internal(format!("request encoding failed: {e}")))?;

        let headers = self.signed_headers(&body)?;
        debug!(
            "CompareFaces in {} ({} + {} image bytes)",
            self.signer.region(),
            request.source.len(),
            request.target.len()
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| PassportError::upstream(PROVIDER, None, e.to_string()))?;

        let status = response.status();
        let header_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| PassportError::upstream(PROVIDER, Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(
                status.as_u16(),
                header_type.as_deref(),
                &text,
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            FaceServiceError::Other(PassportError::upstream(
                PROVIDER,
                Some(status.as_u16()),
                format!("unreadable CompareFaces reply: {e}"),
            ))
        })
    }
}
