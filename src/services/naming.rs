use uuid::Uuid;

pub const STAGING_PREFIX: &str = "staging";
pub const TRUSTED_PREFIX: &str = "trusted";

/// Assigns on-disk identities. Names are a 128-bit random id plus the validated extension
/// and never carry anything else from the client-supplied name.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageNamer;

impl StorageNamer {
    /// `extension` must come from the filename policy's accepted allowlist.
    pub fn assign(&self, extension: &str) -> String {
        format!("{}.{}", Uuid::new_v4().simple(), extension)
    }

    pub fn staging_key(&self, assigned_name: &str) -> String {
        format!("{}/{}", STAGING_PREFIX, assigned_name)
    }

    pub fn trusted_key(&self, assigned_name: &str) -> String {
        format!("{}/{}", TRUSTED_PREFIX, assigned_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_assign_shape() {
        let name = StorageNamer.assign("pdf");
        let (id, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "pdf");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_assign_is_unique() {
        let names: HashSet<String> = (0..1000).map(|_| StorageNamer.assign("png")).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_keys() {
        let namer = StorageNamer;
        assert_eq!(namer.staging_key("abc.pdf"), "staging/abc.pdf");
        assert_eq!(namer.trusted_key("abc.pdf"), "trusted/abc.pdf");
    }
}
