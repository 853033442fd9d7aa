use crate::models::RejectionReason;
use crate::services::registry::{ContentClass, SignatureRegistry};
use crate::services::storage::StorageService;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Verified { detected_type: String },
    Failed(RejectionReason),
}

/// Authoritative content check. Only the persisted bytes count; the filename and declared
/// type play no part beyond selecting which format the bytes must be.
pub struct SignatureVerifier {
    storage: Arc<dyn StorageService>,
    prefix_len: usize,
}

impl SignatureVerifier {
    pub fn new(storage: Arc<dyn StorageService>, prefix_len: usize) -> Self {
        Self {
            storage,
            prefix_len,
        }
    }

    /// Reads a bounded prefix of `storage_key` and checks it against the format bound to the
    /// validated `extension`.
    pub async fn verify(
        &self,
        storage_key: &str,
        class: &ContentClass,
        extension: &str,
    ) -> anyhow::Result<SignatureCheck> {
        let prefix = self.storage.read_prefix(storage_key, self.prefix_len).await?;
        Ok(Self::check_prefix(&prefix, class, extension))
    }

    /// Pure decision over the prefix bytes.
    pub fn check_prefix(prefix: &[u8], class: &ContentClass, extension: &str) -> SignatureCheck {
        if let Some(format) = class.format_for_extension(extension)
            && format.matches(prefix)
        {
            return SignatureCheck::Verified {
                detected_type: format.mime.to_string(),
            };
        }

        match SignatureRegistry::sniff(prefix) {
            Some(detected) => SignatureCheck::Failed(RejectionReason::SignatureMismatch { detected }),
            None => SignatureCheck::Failed(RejectionReason::UndeterminableSignature),
        }
    }
}
