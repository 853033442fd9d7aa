use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Serialize)]
pub enum AuditEventType {
    UploadAccepted,
    UploadRejected,
    PurgeFailed,
    OrphanPurged,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Audit trail for upload decisions. Entries carry the client-supplied name, which never
/// leaves the server.
#[derive(Clone, Copy, Default)]
pub struct AuditService;

impl AuditService {
    pub fn new() -> Self {
        Self
    }

    pub fn log(
        &self,
        event_type: AuditEventType,
        content_class: &str,
        original_name: &str,
        resource: Option<&str>,
        detail: &str,
    ) {
        match event_type {
            AuditEventType::UploadAccepted | AuditEventType::OrphanPurged => info!(
                target: "audit",
                event_type = %event_type,
                content_class = %content_class,
                original_name = ?original_name,
                resource = ?resource,
                detail = %detail,
                "Audit Event Occurred"
            ),
            AuditEventType::UploadRejected => warn!(
                target: "audit",
                event_type = %event_type,
                content_class = %content_class,
                original_name = ?original_name,
                resource = ?resource,
                detail = %detail,
                "Audit Event Occurred"
            ),
            AuditEventType::PurgeFailed => error!(
                target: "audit",
                event_type = %event_type,
                content_class = %content_class,
                original_name = ?original_name,
                resource = ?resource,
                detail = %detail,
                "Audit Event Occurred"
            ),
        }
    }
}
