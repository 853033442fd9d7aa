use crate::models::{RejectionReason, Verdict};
use crate::services::registry::ContentClass;
use percent_encoding::percent_decode_str;

/// Extensions of executable or server-interpretable content. Any of these appearing as a
/// dotted token anywhere in a filename marks a double-extension attempt.
const DANGEROUS_EXTENSIONS: &[&str] = &[
    // Executables
    "exe", "dll", "so", "dylib", "bin", "scr", "pif", "msi", "msp", "bat", "cmd", "ps1",
    "psm1", "sh", "bash", "zsh", "csh", "ksh", "elf", "run", "apk", "deb", "rpm",
    // Scripts
    "js", "mjs", "vbs", "vbe", "jse", "wsf", "wsh", "hta", "py", "pyc", "pyw", "rb", "pl", "pm",
    "lua", "jar", "class", "war", "ear",
    // Server pages
    "php", "php3", "php4", "php5", "php7", "php8", "pht", "phtml", "phar", "asp", "aspx",
    "ascx", "ashx", "asmx", "asa", "jsp", "jspx", "jspf", "cfm", "cfml", "cgi", "fcgi",
    "shtml", "shtm", "stm",
    // Markup served as active content
    "htm", "html", "xhtml", "svg", "xml", "xsl", "xslt",
    // Server configuration
    "htaccess", "htpasswd", "config",
    // Shortcuts and registry files
    "lnk", "url", "reg", "inf", "scf",
];

/// Executable or server-mapped extensions that also show up in ordinary names
/// (`google.com.png`, `acme.inc.pdf`). They only count when a boundary character cuts the
/// segment short, as in `x.cer;.jpg`.
const AMBIGUOUS_EXTENSIONS: &[&str] = &["com", "app", "inc", "cer"];

/// Characters that end an extension token besides a dot.
fn is_token_boundary(c: char) -> bool {
    c.is_control() || c.is_whitespace() || matches!(c, ';' | ':' | '/' | '\\')
}

pub fn is_dangerous_extension(token: &str) -> bool {
    DANGEROUS_EXTENSIONS.contains(&token)
}

/// Drops any client-supplied directory components.
fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or("")
}

/// Final extension, lowercased. Hidden files (".pdf") and trailing dots have none.
pub fn final_extension(filename: &str) -> Option<String> {
    let (stem, ext) = base_name(filename).rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Returns the first dangerous dotted token in the name, e.g. `php` for `payload.php.pdf`.
/// Percent escapes are decoded first, so `x.php%00.pdf` reads as `x.php\0.pdf`.
pub fn find_dangerous_token(filename: &str) -> Option<String> {
    let decoded = percent_decode_str(filename).decode_utf8_lossy().to_lowercase();
    decoded.split('.').skip(1).find_map(|segment| {
        let token = segment.split(is_token_boundary).next().unwrap_or("");
        let truncated = token.len() < segment.len();
        let dangerous = is_dangerous_extension(token)
            || (truncated && AMBIGUOUS_EXTENSIONS.contains(&token));
        dangerous.then(|| token.to_string())
    })
}

/// FilenamePolicy: accepts with the validated, lowercased extension.
///
/// Double-extension detection runs first so it wins the tie when the final extension is
/// also disallowed.
pub fn evaluate_filename(original_name: &str, class: &ContentClass) -> Verdict<String> {
    if let Some(token) = find_dangerous_token(original_name) {
        tracing::warn!("Dangerous extension token '.{}' in upload filename", token);
        return Verdict::Reject(RejectionReason::DoubleExtensionDetected);
    }

    match final_extension(original_name) {
        Some(ext) if class.allows_extension(&ext) => Verdict::Accept(ext),
        _ => Verdict::Reject(RejectionReason::ExtensionNotAllowed),
    }
}

/// Normalizes a declared content type: drops parameters, lowercases, folds browser aliases.
pub fn normalize_mime(content_type: &str) -> Option<String> {
    let parsed: mime::Mime = content_type.trim().parse().ok()?;
    let essence = parsed.essence_str().to_lowercase();

    let normalized = match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        "application/x-pdf" | "application/acrobat" => "application/pdf".to_string(),
        _ => essence,
    };
    Some(normalized)
}

/// DeclaredMimePolicy: advisory only, never sufficient on its own.
pub fn evaluate_declared_mime(declared: Option<&str>, class: &ContentClass) -> Verdict<String> {
    match declared.and_then(normalize_mime) {
        Some(mime) if class.allows_declared_mime(&mime) => Verdict::Accept(mime),
        _ => Verdict::Reject(RejectionReason::MimeNotAllowed),
    }
}

/// Pre-write size check against the declared size, when the client sent one.
pub fn evaluate_declared_size(declared: Option<u64>, class: &ContentClass) -> Verdict<()> {
    match declared {
        Some(size) if size > class.max_size => Verdict::Reject(RejectionReason::SizeExceeded {
            limit: class.max_size,
        }),
        _ => Verdict::Accept(()),
    }
}
