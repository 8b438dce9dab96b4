//! Path sanitization for the single writable-source-directory write API.
//!
//! This is the only write surface the core exposes (§1 Non-goals: "writes go
//! only to one designated writable source directory through a narrow
//! sanitized-path API"). Rejections happen before any OS call, matching
//! §7's "path-sanitization rejection — open returns failure without
//! touching the OS".

const ALLOWED_PUNCTUATION: &[u8] = b"~!@#$%^&_-+=()[]{}';,. ";

const REJECTED_EXTENSIONS: &[&str] = &["qvm", "exe", "app", "dll", "so", "dylib"];
const REJECTED_CONFIG_NAMES: &[&str] = &["q3config.cfg", "autoexec.cfg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeError {
    /// A path segment contained `..`.
    ParentTraversal,
    /// The extension is reserved (code module / executable / bundle) and no
    /// override flag was set.
    ForbiddenExtension,
    /// `q3config.cfg`/`autoexec.cfg` and no special-config flag was set.
    ProtectedConfigName,
}

impl std::fmt::Display for SanitizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            SanitizeError::ParentTraversal => "path segment contains '..'",
            SanitizeError::ForbiddenExtension => "extension is reserved for code modules/executables",
            SanitizeError::ProtectedConfigName => "protected config filename",
        };
        f.write_str(msg)
    }
}
impl std::error::Error for SanitizeError {}

/// Flags unlocking the two restricted write categories. Both default to
/// `false`; a caller must opt in explicitly rather than have it on by
/// default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeOptions {
    pub allow_reserved_extension: bool,
    pub allow_protected_config_name: bool,
}

/// Map every character outside the allow-list to `_`; replace a leading or
/// trailing space/period with `_`.
fn sanitize_chars(segment: &str) -> String {
    let mut out: Vec<u8> = segment
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(&b) {
                b
            } else {
                b'_'
            }
        })
        .collect();
    if let Some(first) = out.first_mut() {
        if *first == b' ' || *first == b'.' {
            *first = b'_';
        }
    }
    if let Some(last) = out.last_mut() {
        if *last == b' ' || *last == b'.' {
            *last = b'_';
        }
    }
    String::from_utf8(out).expect("input bytes were ASCII-safe after mapping")
}

/// Sanitize a caller-supplied relative write path, or reject it outright.
///
/// Rejection happens before the character-allow-list mapping is even
/// meaningful to apply: a `..` segment or a protected name/extension is a
/// structural rejection, not something to be "fixed" by substitution.
pub fn sanitize_write_path(path: &str, opts: SanitizeOptions) -> Result<String, SanitizeError> {
    let segments: Vec<&str> = path.split(['/', '\\']).filter(|s| !s.is_empty()).collect();

    for segment in &segments {
        if segment.contains("..") {
            return Err(SanitizeError::ParentTraversal);
        }
    }

    let lower_full = path.to_ascii_lowercase();
    if !opts.allow_protected_config_name && REJECTED_CONFIG_NAMES.iter().any(|n| lower_full.ends_with(n)) {
        return Err(SanitizeError::ProtectedConfigName);
    }

    if !opts.allow_reserved_extension {
        if let Some(ext) = lower_full.rsplit('.').next() {
            if lower_full.contains('.') && REJECTED_EXTENSIONS.contains(&ext) {
                return Err(SanitizeError::ForbiddenExtension);
            }
        }
    }

    let sanitized_segments: Vec<String> = segments.iter().map(|s| sanitize_chars(s)).collect();
    Ok(sanitized_segments.join("/"))
}
