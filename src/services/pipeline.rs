//! Per-upload ingest state machine.
//!
//! `Received → FilenameChecked → MimeChecked → SizeChecked → Staged → SignatureChecked`,
//! ending in `Trusted` or `Purged`. Policy rejections before `Staged` never touch storage.
//! Once bytes are staged, verification and the commit-or-purge decision run on a detached
//! task, so a dropped request still drives the upload to a terminal state.

use crate::config::SecurityConfig;
use crate::models::{
    IngestOutcome, IngestState, Rejection, RejectionReason, StagedFile, TrustedFile,
    UploadRequest, Verdict,
};
use crate::services::audit::{AuditEventType, AuditService};
use crate::services::naming::StorageNamer;
use crate::services::registry::ContentClass;
use crate::services::signature::{SignatureCheck, SignatureVerifier};
use crate::services::storage::{StorageService, StreamUpload};
use crate::utils::validation::{evaluate_declared_mime, evaluate_declared_size, evaluate_filename};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Conditions under which an upload ends without a policy verdict. Everything but
/// `ClientAborted` means the pipeline cannot guarantee that no untrusted file survives.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Upload body ended before the file was complete")]
    ClientAborted,

    #[error("Storage failure: {0}")]
    Storage(anyhow::Error),

    #[error("Failed to purge staged file {key}")]
    PurgeFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Ingest task aborted: {0}")]
    TaskAborted(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct IngestPipeline {
    storage: Arc<dyn StorageService>,
    verifier: Arc<SignatureVerifier>,
    namer: StorageNamer,
    audit: AuditService,
}

impl IngestPipeline {
    pub fn new(storage: Arc<dyn StorageService>, config: &SecurityConfig) -> Self {
        let verifier = Arc::new(SignatureVerifier::new(
            storage.clone(),
            config.signature_prefix_len,
        ));
        Self {
            storage,
            verifier,
            namer: StorageNamer,
            audit: AuditService::new(),
        }
    }

    /// Runs one upload through every check. Rejections come back as `Ok(Purged)`; only
    /// storage-level failures are errors.
    pub async fn ingest<R>(
        &self,
        class: &ContentClass,
        request: UploadRequest<R>,
    ) -> Result<IngestOutcome, PipelineError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let UploadRequest {
            original_name,
            declared_content_type,
            declared_size,
            body,
        } = request;
        let mut state = IngestState::Received;

        let extension = match evaluate_filename(&original_name, class) {
            Verdict::Accept(ext) => ext,
            Verdict::Reject(reason) => {
                return Ok(self.reject(class, &original_name, state, reason, false));
            }
        };
        state = transition(state, IngestState::FilenameChecked);

        if let Verdict::Reject(reason) =
            evaluate_declared_mime(declared_content_type.as_deref(), class)
        {
            return Ok(self.reject(class, &original_name, state, reason, false));
        }
        state = transition(state, IngestState::MimeChecked);

        if let Verdict::Reject(reason) = evaluate_declared_size(declared_size, class) {
            return Ok(self.reject(class, &original_name, state, reason, false));
        }
        state = transition(state, IngestState::SizeChecked);

        let assigned_name = self.namer.assign(&extension);
        let staging_key = self.namer.staging_key(&assigned_name);

        let upload = match self
            .storage
            .upload_stream_with_hash(&staging_key, Box::new(body), class.max_size)
            .await
        {
            Ok(upload) => upload,
            Err(e) => {
                // an AlreadyExists error means the name was never ours to delete
                let collided = e
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| io.kind() == std::io::ErrorKind::AlreadyExists);
                if !collided {
                    self.purge(&staging_key, class, &original_name).await?;
                }
                tracing::error!("Staging write failed for {}: {:?}", staging_key, e);
                return Err(PipelineError::Storage(e));
            }
        };

        let written = match upload {
            StreamUpload::Complete(written) => written,
            StreamUpload::LimitExceeded { written } => {
                tracing::debug!(
                    "Upload exceeded the {} byte limit after {} bytes",
                    class.max_size,
                    written
                );
                self.purge(&staging_key, class, &original_name).await?;
                let reason = RejectionReason::SizeExceeded {
                    limit: class.max_size,
                };
                return Ok(self.reject(class, &original_name, state, reason, true));
            }
            StreamUpload::SourceFailed { written } => {
                self.purge(&staging_key, class, &original_name).await?;
                tracing::warn!(
                    "Upload body for {} broke off after {} bytes",
                    staging_key,
                    written
                );
                transition(state, IngestState::Purged);
                self.audit.log(
                    AuditEventType::UploadRejected,
                    &class.name,
                    &original_name,
                    None,
                    "incomplete upload body",
                );
                return Err(PipelineError::ClientAborted);
            }
        };

        let staged = StagedFile {
            storage_key: staging_key,
            assigned_name,
            extension,
            size_bytes: written.size,
            sha256: written.hash,
            original_name_for_audit: original_name,
        };
        transition(state, IngestState::Staged);

        let pipeline = self.clone();
        let class = class.clone();
        tokio::spawn(async move { pipeline.settle(&class, staged).await }).await?
    }

    /// `Staged → SignatureChecked → Trusted | Purged`.
    async fn settle(
        &self,
        class: &ContentClass,
        staged: StagedFile,
    ) -> Result<IngestOutcome, PipelineError> {
        let check = match self
            .verifier
            .verify(&staged.storage_key, class, &staged.extension)
            .await
        {
            Ok(check) => check,
            Err(e) => {
                self.purge(&staged.storage_key, class, &staged.original_name_for_audit)
                    .await?;
                return Err(PipelineError::Storage(e));
            }
        };
        let state = transition(IngestState::Staged, IngestState::SignatureChecked);

        match check {
            SignatureCheck::Verified { detected_type } => {
                let trusted_key = self.namer.trusted_key(&staged.assigned_name);
                if let Err(e) = self
                    .storage
                    .move_object(&staged.storage_key, &trusted_key)
                    .await
                {
                    self.purge(&staged.storage_key, class, &staged.original_name_for_audit)
                        .await?;
                    return Err(PipelineError::Storage(e));
                }
                transition(state, IngestState::Trusted);

                self.audit.log(
                    AuditEventType::UploadAccepted,
                    &class.name,
                    &staged.original_name_for_audit,
                    Some(&staged.assigned_name),
                    &detected_type,
                );
                tracing::info!(
                    "Upload accepted as {} ({} bytes, {})",
                    staged.assigned_name,
                    staged.size_bytes,
                    detected_type
                );
                Ok(IngestOutcome::Trusted(TrustedFile::promote(
                    staged,
                    trusted_key,
                    detected_type,
                )))
            }
            SignatureCheck::Failed(reason) => {
                self.purge(&staged.storage_key, class, &staged.original_name_for_audit)
                    .await?;
                Ok(self.reject(
                    class,
                    &staged.original_name_for_audit,
                    state,
                    reason,
                    true,
                ))
            }
        }
    }

    /// Deletes a staged key. Failure is surfaced, never swallowed: the rejected bytes may
    /// still be on storage.
    async fn purge(
        &self,
        key: &str,
        class: &ContentClass,
        original_name: &str,
    ) -> Result<(), PipelineError> {
        match self.storage.delete_file(key).await {
            Ok(()) => {
                tracing::debug!("Purged staged file {}", key);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "❌ Failed to purge rejected upload {}; file may remain on storage: {:?}",
                    key,
                    e
                );
                self.audit.log(
                    AuditEventType::PurgeFailed,
                    &class.name,
                    original_name,
                    Some(key),
                    &e.to_string(),
                );
                Err(PipelineError::PurgeFailed {
                    key: key.to_string(),
                    source: e,
                })
            }
        }
    }

    fn reject(
        &self,
        class: &ContentClass,
        original_name: &str,
        at: IngestState,
        reason: RejectionReason,
        wrote_to_storage: bool,
    ) -> IngestOutcome {
        transition(at, IngestState::Purged);
        self.audit.log(
            AuditEventType::UploadRejected,
            &class.name,
            original_name,
            None,
            &reason.to_string(),
        );
        IngestOutcome::Purged(Rejection {
            reason,
            at,
            wrote_to_storage,
        })
    }
}

fn transition(from: IngestState, to: IngestState) -> IngestState {
    debug_assert!(!from.is_terminal(), "no transitions out of {:?}", from);
    tracing::debug!("Ingest state {:?} -> {:?}", from, to);
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::registry::SignatureRegistry;
    use crate::services::storage::LocalStorageService;

    async fn setup() -> (
        tempfile::TempDir,
        Arc<LocalStorageService>,
        IngestPipeline,
        SignatureRegistry,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::init(dir.path()).await.unwrap());
        let config = SecurityConfig::default();
        let pipeline = IngestPipeline::new(storage.clone(), &config);
        (dir, storage, pipeline, SignatureRegistry::from_config(&config))
    }

    #[tokio::test]
    async fn test_filename_rejection_writes_nothing() {
        let (_dir, storage, pipeline, registry) = setup().await;
        let class = registry.class("pdf").unwrap();

        let request = UploadRequest::new("payload.php.pdf", Some("application/pdf"), &b"%PDF-1.4"[..]);
        let outcome = pipeline.ingest(class, request).await.unwrap();

        let IngestOutcome::Purged(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, RejectionReason::DoubleExtensionDetected);
        assert_eq!(rejection.at, IngestState::Received);
        assert!(!rejection.wrote_to_storage);
        assert!(storage.list_objects("staging").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mime_rejection_writes_nothing() {
        let (_dir, storage, pipeline, registry) = setup().await;
        let class = registry.class("pdf").unwrap();

        let request = UploadRequest::new("doc.pdf", Some("text/plain"), &b"%PDF-1.4"[..]);
        let outcome = pipeline.ingest(class, request).await.unwrap();

        let IngestOutcome::Purged(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, RejectionReason::MimeNotAllowed);
        assert_eq!(rejection.at, IngestState::FilenameChecked);
        assert!(storage.list_objects("staging").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declared_size_rejection() {
        let (_dir, _storage, pipeline, registry) = setup().await;
        let class = registry.class("pdf").unwrap();

        let request = UploadRequest::new("doc.pdf", Some("application/pdf"), &b"%PDF-1.4"[..])
            .with_declared_size(class.max_size + 1);
        let outcome = pipeline.ingest(class, request).await.unwrap();

        let IngestOutcome::Purged(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert!(matches!(rejection.reason, RejectionReason::SizeExceeded { .. }));
        assert!(!rejection.wrote_to_storage);
    }

    #[tokio::test]
    async fn test_trusted_file_lands_in_trusted_area() {
        let (_dir, storage, pipeline, registry) = setup().await;
        let class = registry.class("pdf").unwrap();
        let body = b"%PDF-1.0\n1 0 obj<<>>endobj\ntrailer<<>>\n%%EOF\n";

        let request = UploadRequest::new("valid_doc.pdf", Some("application/pdf"), &body[..]);
        let outcome = pipeline.ingest(class, request).await.unwrap();

        let IngestOutcome::Trusted(file) = outcome else {
            panic!("expected trusted file");
        };
        assert_eq!(file.detected_type, "application/pdf");
        assert_eq!(file.size_bytes, body.len() as u64);
        assert_eq!(file.original_name_for_audit, "valid_doc.pdf");
        assert!(file.assigned_name.ends_with(".pdf"));
        assert!(!file.assigned_name.contains("valid_doc"));
        assert!(storage.file_exists(&file.storage_key).await.unwrap());
        assert!(storage.list_objects("staging").await.unwrap().is_empty());
    }
}
