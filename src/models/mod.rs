use serde::Serialize;
use std::fmt;
use tokio::io::AsyncRead;

/// An upload as received from the transport layer. Lives for one request only.
pub struct UploadRequest<R> {
    pub original_name: String,
    pub declared_content_type: Option<String>,
    pub declared_size: Option<u64>,
    pub body: R,
}

impl<R: AsyncRead + Unpin + Send> UploadRequest<R> {
    pub fn new(original_name: impl Into<String>, declared_content_type: Option<&str>, body: R) -> Self {
        Self {
            original_name: original_name.into(),
            declared_content_type: declared_content_type.map(str::to_string),
            declared_size: None,
            body,
        }
    }

    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }
}

/// Outcome of a single policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    Accept(T),
    Reject(RejectionReason),
}

/// Machine-readable rejection reasons, used for logging and audit only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    ExtensionNotAllowed,
    DoubleExtensionDetected,
    MimeNotAllowed,
    SizeExceeded { limit: u64 },
    SignatureMismatch { detected: String },
    UndeterminableSignature,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ExtensionNotAllowed => "extension-not-allowed",
            Self::DoubleExtensionDetected => "double-extension-detected",
            Self::MimeNotAllowed => "mime-not-allowed",
            Self::SizeExceeded { .. } => "size-exceeded",
            Self::SignatureMismatch { .. } => "signature-mismatch",
            Self::UndeterminableSignature => "undeterminable-signature",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeExceeded { limit } => write!(f, "{} (limit {} bytes)", self.code(), limit),
            Self::SignatureMismatch { detected } => write!(f, "{} ({})", self.code(), detected),
            _ => f.write_str(self.code()),
        }
    }
}

/// States of the ingest state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestState {
    Received,
    FilenameChecked,
    MimeChecked,
    SizeChecked,
    Staged,
    SignatureChecked,
    Trusted,
    Purged,
}

impl IngestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Trusted | Self::Purged)
    }
}

/// Bytes written to the staging area but not yet trusted.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub storage_key: String,
    pub assigned_name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub original_name_for_audit: String,
}

/// A staged file whose signature has been verified and which now lives in the trusted area.
#[derive(Debug, Clone)]
pub struct TrustedFile {
    pub storage_key: String,
    pub assigned_name: String,
    pub detected_type: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub original_name_for_audit: String,
}

impl TrustedFile {
    pub fn promote(staged: StagedFile, storage_key: String, detected_type: String) -> Self {
        Self {
            storage_key,
            assigned_name: staged.assigned_name,
            detected_type,
            size_bytes: staged.size_bytes,
            sha256: staged.sha256,
            original_name_for_audit: staged.original_name_for_audit,
        }
    }
}

/// Why an upload ended in `Purged`, and whether anything ever reached storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    /// Last state reached before the rejection.
    pub at: IngestState,
    pub wrote_to_storage: bool,
}

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Trusted(TrustedFile),
    Purged(Rejection),
}

impl IngestOutcome {
    pub fn state(&self) -> IngestState {
        match self {
            Self::Trusted(_) => IngestState::Trusted,
            Self::Purged(_) => IngestState::Purged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(RejectionReason::ExtensionNotAllowed.code(), "extension-not-allowed");
        assert_eq!(
            RejectionReason::SizeExceeded { limit: 10 }.to_string(),
            "size-exceeded (limit 10 bytes)"
        );
        assert_eq!(
            RejectionReason::SignatureMismatch {
                detected: "image/png".to_string()
            }
            .to_string(),
            "signature-mismatch (image/png)"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(IngestState::Trusted.is_terminal());
        assert!(IngestState::Purged.is_terminal());
        assert!(!IngestState::Staged.is_terminal());
    }
}
