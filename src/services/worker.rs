use crate::config::SecurityConfig;
use crate::services::audit::{AuditEventType, AuditService};
use crate::services::naming::STAGING_PREFIX;
use crate::services::storage::StorageService;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Purges staged files that never reached a terminal state, e.g. when the client went away
/// mid-upload.
pub struct BackgroundWorker {
    storage: Arc<dyn StorageService>,
    audit: AuditService,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        storage: Arc<dyn StorageService>,
        config: &SecurityConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            audit: AuditService::new(),
            max_age: Duration::from_secs(config.staging_max_age_secs),
            interval: Duration::from_secs(config.staging_sweep_interval_secs),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Staging sweeper started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Staging sweeper shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!("Staging sweep failed: {:?}", e);
                    }
                }
            }
        }
    }

    /// Deletes every staged object older than the configured age; returns how many went.
    pub async fn sweep_once(&self) -> anyhow::Result<usize> {
        tracing::debug!("🧹 Sweeping orphaned staged files...");
        let cutoff = Utc::now() - chrono::Duration::from_std(self.max_age)?;
        let mut purged = 0;

        for key in self.storage.list_objects(STAGING_PREFIX).await? {
            let metadata = match self.storage.get_object_metadata(&key).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!("Could not stat staged file {}: {}", key, e);
                    continue;
                }
            };

            let is_orphan = metadata
                .last_modified
                .is_some_and(|modified| modified <= cutoff);
            if !is_orphan {
                continue;
            }

            match self.storage.delete_file(&key).await {
                Ok(()) => {
                    purged += 1;
                    self.audit.log(
                        AuditEventType::OrphanPurged,
                        "-",
                        "-",
                        Some(&key),
                        &format!("{} bytes", metadata.size),
                    );
                }
                Err(e) => {
                    tracing::error!("❌ Failed to purge orphaned staged file {}: {:?}", key, e);
                    self.audit.log(
                        AuditEventType::PurgeFailed,
                        "-",
                        "-",
                        Some(&key),
                        &e.to_string(),
                    );
                }
            }
        }

        if purged > 0 {
            tracing::info!("✅ Purged {} orphaned staged file(s)", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::LocalStorageService;

    async fn stage(storage: &LocalStorageService, key: &str) {
        storage
            .upload_stream_with_hash(key, Box::new(&b"partial"[..]), 64)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_purges_old_staged_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::init(dir.path()).await.unwrap());
        stage(&storage, "staging/old.pdf").await;
        stage(&storage, "trusted/keep.pdf").await;

        let (_tx, rx) = watch::channel(false);
        let config = SecurityConfig {
            staging_max_age_secs: 0,
            ..SecurityConfig::default()
        };
        let worker = BackgroundWorker::new(storage.clone(), &config, rx);

        assert_eq!(worker.sweep_once().await.unwrap(), 1);
        assert!(!storage.file_exists("staging/old.pdf").await.unwrap());
        assert!(storage.file_exists("trusted/keep.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_staged_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::init(dir.path()).await.unwrap());
        stage(&storage, "staging/fresh.png").await;

        let (_tx, rx) = watch::channel(false);
        let worker = BackgroundWorker::new(storage.clone(), &SecurityConfig::default(), rx);

        assert_eq!(worker.sweep_once().await.unwrap(), 0);
        assert!(storage.file_exists("staging/fresh.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::init(dir.path()).await.unwrap());
        let (tx, rx) = watch::channel(false);
        let worker = BackgroundWorker::new(storage, &SecurityConfig::default(), rx);

        let handle = tokio::spawn(worker.run());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
