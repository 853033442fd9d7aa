use crate::models::{IngestOutcome, RejectionReason};
use axum::http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Accepted,
    Rejected,
}

/// Caller-facing rejection categories. Coarser than the internal reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionCategory {
    InvalidExtension,
    DoubleExtension,
    InvalidDeclaredType,
    SizeExceeded,
    SignatureMismatch,
    UndeterminableSignature,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<RejectionCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct ResultReporter;

impl ResultReporter {
    pub fn category(reason: &RejectionReason) -> RejectionCategory {
        match reason {
            RejectionReason::ExtensionNotAllowed => RejectionCategory::InvalidExtension,
            RejectionReason::DoubleExtensionDetected => RejectionCategory::DoubleExtension,
            RejectionReason::MimeNotAllowed => RejectionCategory::InvalidDeclaredType,
            RejectionReason::SizeExceeded { .. } => RejectionCategory::SizeExceeded,
            RejectionReason::SignatureMismatch { .. } => RejectionCategory::SignatureMismatch,
            RejectionReason::UndeterminableSignature => RejectionCategory::UndeterminableSignature,
        }
    }

    pub fn status_for(category: RejectionCategory) -> StatusCode {
        match category {
            RejectionCategory::InvalidExtension | RejectionCategory::DoubleExtension => {
                StatusCode::BAD_REQUEST
            }
            RejectionCategory::InvalidDeclaredType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RejectionCategory::SizeExceeded => StatusCode::PAYLOAD_TOO_LARGE,
            RejectionCategory::SignatureMismatch | RejectionCategory::UndeterminableSignature => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        }
    }

    fn message(category: RejectionCategory) -> &'static str {
        match category {
            RejectionCategory::InvalidExtension => "File type is not allowed",
            RejectionCategory::DoubleExtension => "Filename is not allowed",
            RejectionCategory::InvalidDeclaredType => "Declared content type is not allowed",
            RejectionCategory::SizeExceeded => "File exceeds the maximum allowed size",
            RejectionCategory::SignatureMismatch => "File content does not match its type",
            RejectionCategory::UndeterminableSignature => "File content could not be identified",
        }
    }

    pub fn rejected(
        category: RejectionCategory,
        detected_type: Option<String>,
    ) -> (StatusCode, UploadResponse) {
        (
            Self::status_for(category),
            UploadResponse {
                status: UploadStatus::Rejected,
                storage_name: None,
                detected_type,
                size_bytes: None,
                category: Some(category),
                message: Some(Self::message(category).to_string()),
            },
        )
    }

    /// Maps a pipeline outcome to status + body. Only the detected type of a mismatching
    /// signature is passed through; no paths or internal reason detail.
    pub fn report(outcome: &IngestOutcome) -> (StatusCode, UploadResponse) {
        match outcome {
            IngestOutcome::Trusted(file) => (
                StatusCode::CREATED,
                UploadResponse {
                    status: UploadStatus::Accepted,
                    storage_name: Some(file.assigned_name.clone()),
                    detected_type: Some(file.detected_type.clone()),
                    size_bytes: Some(file.size_bytes),
                    category: None,
                    message: None,
                },
            ),
            IngestOutcome::Purged(rejection) => {
                let detected_type = match &rejection.reason {
                    RejectionReason::SignatureMismatch { detected } => Some(detected.clone()),
                    _ => None,
                };
                Self::rejected(Self::category(&rejection.reason), detected_type)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IngestState, Rejection, TrustedFile};

    fn purged(reason: RejectionReason) -> IngestOutcome {
        IngestOutcome::Purged(Rejection {
            reason,
            at: IngestState::SignatureChecked,
            wrote_to_storage: true,
        })
    }

    #[test]
    fn test_accepted_report() {
        let outcome = IngestOutcome::Trusted(TrustedFile {
            storage_key: "trusted/abc.pdf".to_string(),
            assigned_name: "abc.pdf".to_string(),
            detected_type: "application/pdf".to_string(),
            size_bytes: 42,
            sha256: "00".repeat(32),
            original_name_for_audit: "valid_doc.pdf".to_string(),
        });

        let (status, body) = ResultReporter::report(&outcome);
        assert_eq!(status, StatusCode::CREATED);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "accepted",
                "storageName": "abc.pdf",
                "detectedType": "application/pdf",
                "sizeBytes": 42
            })
        );
    }

    #[test]
    fn test_mismatch_report_includes_detected_type() {
        let (status, body) = ResultReporter::report(&purged(RejectionReason::SignatureMismatch {
            detected: "image/png".to_string(),
        }));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["category"], "signature-mismatch");
        assert_eq!(json["detectedType"], "image/png");
        assert!(json.get("storageName").is_none());
    }

    #[test]
    fn test_category_mapping() {
        let cases = [
            (RejectionReason::ExtensionNotAllowed, "invalid-extension", StatusCode::BAD_REQUEST),
            (RejectionReason::DoubleExtensionDetected, "double-extension", StatusCode::BAD_REQUEST),
            (
                RejectionReason::MimeNotAllowed,
                "invalid-declared-type",
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                RejectionReason::SizeExceeded { limit: 1 },
                "size-exceeded",
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                RejectionReason::UndeterminableSignature,
                "undeterminable-signature",
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];

        for (reason, category, expected_status) in cases {
            let (status, body) = ResultReporter::report(&purged(reason));
            let json = serde_json::to_value(&body).unwrap();
            assert_eq!(status, expected_status);
            assert_eq!(json["category"], category);
            assert!(json.get("detectedType").is_none());
            assert!(json["message"].as_str().is_some());
        }
    }
}
