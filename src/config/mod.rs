use std::env;
use std::path::PathBuf;

/// Security configuration for the upload pipeline
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Root of the restricted storage area (default: "./uploads")
    pub storage_root: PathBuf,

    /// Maximum image size in bytes (default: 5 MB)
    pub max_image_size: u64,

    /// Maximum PDF size in bytes (default: 2 MB)
    pub max_pdf_size: u64,

    /// Bytes read from a staged file for signature detection (default: 8 KB)
    pub signature_prefix_len: usize,

    /// Age after which an unverified staged file counts as orphaned (default: 15 min)
    pub staging_max_age_secs: u64,

    /// Interval between staging sweeps (default: 5 min)
    pub staging_sweep_interval_secs: u64,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./uploads"),
            max_image_size: 5 * 1024 * 1024, // 5 MB
            max_pdf_size: 2 * 1024 * 1024,   // 2 MB
            signature_prefix_len: 8 * 1024,
            staging_max_age_secs: 15 * 60,
            staging_sweep_interval_secs: 5 * 60,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl SecurityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variables on top of this config, e.g. a preset.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup over the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_overrides(lookup)
    }

    /// Overrides fields from `lookup`. Missing or unparseable values keep the current value.
    pub fn with_overrides<F>(self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            storage_root: lookup("STORAGE_ROOT")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(self.storage_root),

            max_image_size: lookup("MAX_IMAGE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.max_image_size),

            max_pdf_size: lookup("MAX_PDF_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.max_pdf_size),

            signature_prefix_len: lookup("SIGNATURE_PREFIX_LEN")
                .and_then(|v| v.parse().ok())
                .filter(|len: &usize| *len > 0)
                .unwrap_or(self.signature_prefix_len),

            staging_max_age_secs: lookup("STAGING_MAX_AGE_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.staging_max_age_secs),

            staging_sweep_interval_secs: lookup("STAGING_SWEEP_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(self.staging_sweep_interval_secs),

            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(self.allowed_origins),
        }
    }

    /// Create config for development (local storage dir, quick sweeps)
    pub fn development() -> Self {
        Self {
            storage_root: PathBuf::from("./uploads-dev"),
            staging_max_age_secs: 60,
            staging_sweep_interval_secs: 30,
            ..Self::default()
        }
    }

    /// Create config for production (system storage dir, no CORS origins unless configured)
    pub fn production() -> Self {
        Self {
            storage_root: PathBuf::from("/var/lib/secure-upload/storage"),
            allowed_origins: Vec::new(),
            ..Self::default()
        }
    }

    /// Largest per-class limit; used to size the HTTP body limit.
    pub fn largest_upload_limit(&self) -> u64 {
        self.max_image_size.max(self.max_pdf_size)
    }
}
