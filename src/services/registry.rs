use crate::config::SecurityConfig;
use std::collections::BTreeSet;

pub type SignatureMatcher = fn(&[u8]) -> bool;

/// One binary format accepted by a content class.
#[derive(Debug, Clone)]
pub struct FileFormat {
    /// Canonical MIME type reported once the signature matches
    pub mime: &'static str,
    pub extensions: &'static [&'static str],
    pub declared_mime_types: &'static [&'static str],
    pub matcher: SignatureMatcher,
}

impl FileFormat {
    pub fn matches(&self, prefix: &[u8]) -> bool {
        (self.matcher)(prefix)
    }
}

pub fn is_jpeg(buf: &[u8]) -> bool {
    buf.starts_with(&[0xFF, 0xD8, 0xFF])
}

pub fn is_png(buf: &[u8]) -> bool {
    buf.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A])
}

pub fn is_gif(buf: &[u8]) -> bool {
    buf.starts_with(b"GIF87a") || buf.starts_with(b"GIF89a")
}

pub fn is_webp(buf: &[u8]) -> bool {
    buf.len() >= 12 && buf.starts_with(b"RIFF") && &buf[8..12] == b"WEBP"
}

pub fn is_pdf(buf: &[u8]) -> bool {
    buf.starts_with(b"%PDF-")
}

pub const JPEG: FileFormat = FileFormat {
    mime: "image/jpeg",
    extensions: &["jpg", "jpeg"],
    declared_mime_types: &["image/jpeg"],
    matcher: is_jpeg,
};

pub const PNG: FileFormat = FileFormat {
    mime: "image/png",
    extensions: &["png"],
    declared_mime_types: &["image/png"],
    matcher: is_png,
};

pub const GIF: FileFormat = FileFormat {
    mime: "image/gif",
    extensions: &["gif"],
    declared_mime_types: &["image/gif"],
    matcher: is_gif,
};

pub const WEBP: FileFormat = FileFormat {
    mime: "image/webp",
    extensions: &["webp"],
    declared_mime_types: &["image/webp"],
    matcher: is_webp,
};

pub const PDF: FileFormat = FileFormat {
    mime: "application/pdf",
    extensions: &["pdf"],
    declared_mime_types: &["application/pdf"],
    matcher: is_pdf,
};

/// Signatures of content that must never be trusted, checked when nothing else matched.
const EXECUTABLE_SIGNATURES: &[(&[u8], &str)] = &[
    (&[0x7F, 0x45, 0x4C, 0x46], "application/x-executable"), // ELF
    (&[0x4D, 0x5A], "application/vnd.microsoft.portable-executable"), // PE/COFF
    (&[0xFE, 0xED, 0xFA, 0xCE], "application/x-mach-binary"),
    (&[0xFE, 0xED, 0xFA, 0xCF], "application/x-mach-binary"),
    (&[0xCE, 0xFA, 0xED, 0xFE], "application/x-mach-binary"),
    (&[0xCF, 0xFA, 0xED, 0xFE], "application/x-mach-binary"),
    (b"#!", "text/x-shellscript"),
    (b"<?php", "application/x-httpd-php"),
];

/// A named policy bundle governing one category of accepted upload.
#[derive(Debug, Clone)]
pub struct ContentClass {
    pub name: String,
    pub max_size: u64,
    pub formats: Vec<FileFormat>,
}

impl ContentClass {
    pub fn new(name: impl Into<String>, max_size: u64, formats: Vec<FileFormat>) -> Self {
        Self {
            name: name.into(),
            max_size,
            formats,
        }
    }

    pub fn allowed_extensions(&self) -> BTreeSet<&'static str> {
        self.formats
            .iter()
            .flat_map(|f| f.extensions.iter().copied())
            .collect()
    }

    pub fn allowed_declared_mime_types(&self) -> BTreeSet<&'static str> {
        self.formats
            .iter()
            .flat_map(|f| f.declared_mime_types.iter().copied())
            .collect()
    }

    /// `extension` must already be lowercased.
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.format_for_extension(extension).is_some()
    }

    /// `mime` must already be normalized.
    pub fn allows_declared_mime(&self, mime: &str) -> bool {
        self.formats
            .iter()
            .any(|f| f.declared_mime_types.contains(&mime))
    }

    pub fn format_for_extension(&self, extension: &str) -> Option<&FileFormat> {
        self.formats
            .iter()
            .find(|f| f.extensions.contains(&extension))
    }
}

/// Static table of content classes plus the format sniffer.
#[derive(Debug, Clone)]
pub struct SignatureRegistry {
    classes: Vec<ContentClass>,
}

impl SignatureRegistry {
    pub fn new(classes: Vec<ContentClass>) -> Self {
        Self { classes }
    }

    /// The standard `image` and `pdf` classes with limits taken from config.
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(vec![
            ContentClass::new("image", config.max_image_size, vec![JPEG, PNG, GIF, WEBP]),
            ContentClass::new("pdf", config.max_pdf_size, vec![PDF]),
        ])
    }

    pub fn class(&self, name: &str) -> Option<&ContentClass> {
        self.classes.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn classes(&self) -> &[ContentClass] {
        &self.classes
    }

    /// Best-effort identification of any known format, independent of class.
    pub fn sniff(prefix: &[u8]) -> Option<String> {
        if prefix.is_empty() {
            return None;
        }

        for format in [JPEG, PNG, GIF, WEBP, PDF] {
            if format.matches(prefix) {
                return Some(format.mime.to_string());
            }
        }

        if let Some(kind) = infer::get(prefix) {
            return Some(kind.mime_type().to_string());
        }

        EXECUTABLE_SIGNATURES
            .iter()
            .find(|(signature, _)| prefix.starts_with(signature))
            .map(|(_, mime)| mime.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SignatureRegistry {
        SignatureRegistry::from_config(&SecurityConfig::default())
    }

    #[test]
    fn test_standard_classes() {
        let registry = registry();
        let image = registry.class("image").unwrap();
        assert_eq!(
            image.allowed_extensions().into_iter().collect::<Vec<_>>(),
            vec!["gif", "jpeg", "jpg", "png", "webp"]
        );
        assert!(image.allows_declared_mime("image/png"));
        assert!(!image.allows_declared_mime("application/pdf"));

        let pdf = registry.class("PDF").unwrap();
        assert_eq!(pdf.max_size, 2 * 1024 * 1024);
        assert_eq!(pdf.format_for_extension("pdf").unwrap().mime, "application/pdf");
        assert!(registry.class("video").is_none());
    }

    #[test]
    fn test_format_matchers() {
        assert!(is_jpeg(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(is_png(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00]));
        assert!(!is_png(&[0x89, 0x50, 0x4E, 0x47]));
        assert!(is_gif(b"GIF89a\x01\x00"));
        assert!(is_webp(b"RIFF\x24\x00\x00\x00WEBPVP8 "));
        assert!(!is_webp(b"RIFF\x24\x00\x00\x00WAVEfmt "));
        assert!(is_pdf(b"%PDF-1.0\n"));
        assert!(!is_pdf(b"%PD"));
    }

    #[test]
    fn test_sniff() {
        assert_eq!(
            SignatureRegistry::sniff(b"%PDF-1.7\n").as_deref(),
            Some("application/pdf")
        );
        assert!(SignatureRegistry::sniff(&[0x7F, 0x45, 0x4C, 0x46, 0x02, 0x01, 0x01, 0x00]).is_some());
        assert_eq!(
            SignatureRegistry::sniff(b"<?php system($_GET['c']); ?>").as_deref(),
            Some("application/x-httpd-php")
        );
        assert_eq!(SignatureRegistry::sniff(b"just some plain text"), None);
        assert_eq!(SignatureRegistry::sniff(b""), None);
    }
}
