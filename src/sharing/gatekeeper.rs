//! # Upload Gatekeeper
//!
//! Validates upload candidates and derives their storage keys. Nothing here
//! touches the store.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::errors::{Rejection, ShareResult};

/// Content type assumed when the client declares none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Longest sanitized filename, in bytes. Keeps storage keys and their
/// sidecar names under common filesystem name limits.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Upload acceptance rules
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Lowercase extensions without the leading dot
    pub allowed_extensions: HashSet<String>,

    /// Allowed MIME types, `type/*` wildcards allowed (empty = all)
    pub allowed_content_types: Vec<String>,

    /// Largest accepted file in bytes
    pub max_size: u64,
}

impl UploadPolicy {
    pub fn new<I, S>(allowed_extensions: I, max_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            allowed_content_types: Vec::new(),
            max_size,
        }
    }

    pub fn with_content_types(mut self, types: Vec<String>) -> Self {
        self.allowed_content_types = types;
        self
    }

    /// Validate a candidate against this policy
    pub fn validate(
        &self,
        filename: &str,
        declared_content_type: Option<&str>,
        size_bytes: u64,
    ) -> ShareResult<ValidatedUpload> {
        let upload = validate(
            filename,
            declared_content_type,
            size_bytes,
            &self.allowed_extensions,
            self.max_size,
        )?;

        if !is_content_type_allowed(&self.allowed_content_types, &upload.content_type) {
            return Err(Rejection::ContentTypeNotAllowed(upload.content_type).into());
        }
        Ok(upload)
    }

    /// Reject a request whose declared length already exceeds the limit,
    /// before any of its body is read.
    pub fn check_declared_size(&self, declared: Option<u64>) -> ShareResult<()> {
        match declared {
            Some(size) if size > self.max_size => Err(Rejection::TooLarge {
                size,
                max: self.max_size,
            }
            .into()),
            _ => Ok(()),
        }
    }
}

/// An upload that passed the gatekeeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub original_filename: String,
    pub sanitized_filename: String,
    pub extension: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl ValidatedUpload {
    /// Storage key for this upload: `{YYYYmmdd-HHMMSS}-{name}` on the first
    /// attempt, `{YYYYmmdd-HHMMSS}-{attempt}-{name}` when that key is taken.
    pub fn storage_key(&self, now: DateTime<Utc>, attempt: u32) -> String {
        let stamp = now.format("%Y%m%d-%H%M%S");
        if attempt == 0 {
            format!("{}-{}", stamp, self.sanitized_filename)
        } else {
            format!("{}-{}-{}", stamp, attempt, self.sanitized_filename)
        }
    }
}

/// Validate an upload candidate. Extensions match case-insensitively, with
/// or without a leading dot in `allowed_extensions`.
pub fn validate(
    filename: &str,
    declared_content_type: Option<&str>,
    size_bytes: u64,
    allowed_extensions: &HashSet<String>,
    max_size: u64,
) -> ShareResult<ValidatedUpload> {
    let sanitized = sanitize_filename(filename).ok_or(Rejection::EmptyFilename)?;

    let extension = match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => return Err(Rejection::MissingExtension.into()),
    };
    let allowed = allowed_extensions.contains(&extension)
        || allowed_extensions
            .iter()
            .any(|a| a.trim().trim_start_matches('.').eq_ignore_ascii_case(&extension));
    if !allowed {
        return Err(Rejection::ExtensionNotAllowed(extension).into());
    }

    if size_bytes > max_size {
        return Err(Rejection::TooLarge {
            size: size_bytes,
            max: max_size,
        }
        .into());
    }
    if size_bytes == 0 {
        return Err(Rejection::EmptyFile.into());
    }

    let content_type = normalize_content_type(declared_content_type)?;

    Ok(ValidatedUpload {
        original_filename: filename.to_string(),
        sanitized_filename: sanitized,
        extension,
        content_type,
        size_bytes,
    })
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap_or_else(|e| unreachable!("{}", e)))
}

/// Reduce a client-supplied name to a single safe path component.
///
/// Keeps the last component after `/` or `\`, drops control characters,
/// collapses whitespace runs to `_`, and trims leading dots. Names longer
/// than [`MAX_FILENAME_BYTES`] are cut on a char boundary, keeping the
/// extension. Returns `None` when nothing is left.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let visible: String = base.chars().filter(|c| !c.is_control()).collect();
    let collapsed = whitespace_run().replace_all(visible.trim(), "_");
    let cleaned = collapsed.trim_start_matches('.');

    if cleaned.is_empty() {
        None
    } else {
        Some(truncate_filename(cleaned))
    }
}

fn truncate_filename(name: &str) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() < MAX_FILENAME_BYTES / 2 => {
            let budget = MAX_FILENAME_BYTES - ext.len() - 1;
            format!("{}.{}", floor_char_boundary(stem, budget), ext)
        }
        _ => floor_char_boundary(name, MAX_FILENAME_BYTES).to_string(),
    }
}

fn floor_char_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn normalize_content_type(declared: Option<&str>) -> ShareResult<String> {
    let raw = match declared.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_CONTENT_TYPE.to_string()),
        Some(raw) => raw,
    };

    // Parameters such as charset are kept, the essence is validated
    let essence = raw.split(';').next().unwrap_or_default().trim();
    let valid = match essence.split_once('/') {
        Some((ty, sub)) => {
            !ty.is_empty()
                && !sub.is_empty()
                && !sub.contains('/')
                && essence.chars().all(|c| c.is_ascii_graphic())
        }
        None => false,
    };

    if valid {
        Ok(raw.to_ascii_lowercase())
    } else {
        Err(Rejection::InvalidContentType(raw.to_string()).into())
    }
}

fn is_content_type_allowed(allowed: &[String], content_type: &str) -> bool {
    if allowed.is_empty() {
        return true;
    }

    let essence = content_type.split(';').next().unwrap_or_default().trim();
    allowed.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('/') => essence.starts_with(prefix),
        _ => pattern.eq_ignore_ascii_case(essence),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharing::errors::ShareError;
    use chrono::TimeZone;

    const MB: u64 = 1024 * 1024;

    fn policy() -> UploadPolicy {
        UploadPolicy::new(
            ["pdf", "doc", "docx", "txt", "png", "jpg", "jpeg", "gif"],
            16 * MB,
        )
    }

    fn rejection(result: ShareResult<ValidatedUpload>) -> Rejection {
        match result {
            Err(ShareError::Validation(r)) => r,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_accepts_and_keys_report() {
        let upload = policy()
            .validate("report.PDF", Some("application/pdf"), 5 * MB)
            .unwrap();
        assert_eq!(upload.extension, "pdf");
        assert_eq!(upload.sanitized_filename, "report.PDF");

        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();
        assert_eq!(upload.storage_key(now, 0), "20240115-103045-report.PDF");
        assert_eq!(upload.storage_key(now, 2), "20240115-103045-2-report.PDF");
    }

    #[test]
    fn test_key_ends_with_sanitized_name() {
        let now = Utc::now();
        for name in ["a.txt", "my notes.txt", "../../etc/passwd.txt", "C:\\Users\\me\\pic.PNG"] {
            let upload = policy().validate(name, None, 10).unwrap();
            let key = upload.storage_key(now, 0);
            assert!(key.ends_with(&upload.sanitized_filename), "{}", key);
            assert!(!key.contains('/') && !key.contains('\\'));
        }
    }

    #[test]
    fn test_rejects_missing_or_unlisted_extension() {
        assert_eq!(rejection(policy().validate("README", None, 10)), Rejection::MissingExtension);
        assert_eq!(rejection(policy().validate("archive.", None, 10)), Rejection::MissingExtension);
        assert_eq!(rejection(policy().validate(".pdf", None, 10)), Rejection::MissingExtension);
        assert_eq!(
            rejection(policy().validate("run.exe", None, 10)),
            Rejection::ExtensionNotAllowed("exe".into())
        );
    }

    #[test]
    fn test_size_limits() {
        assert_eq!(
            rejection(policy().validate("big.pdf", None, 16 * MB + 1)),
            Rejection::TooLarge {
                size: 16 * MB + 1,
                max: 16 * MB
            }
        );
        assert!(policy().validate("edge.pdf", None, 16 * MB).is_ok());
        assert_eq!(rejection(policy().validate("empty.pdf", None, 0)), Rejection::EmptyFile);
    }

    #[test]
    fn test_declared_size_checked_early() {
        assert!(policy().check_declared_size(None).is_ok());
        assert!(policy().check_declared_size(Some(MB)).is_ok());
        assert!(policy().check_declared_size(Some(17 * MB)).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.PDF").as_deref(), Some("report.PDF"));
        assert_eq!(sanitize_filename("dir/sub/file.txt").as_deref(), Some("file.txt"));
        assert_eq!(sanitize_filename("a\\b\\c.doc").as_deref(), Some("c.doc"));
        assert_eq!(sanitize_filename("bad\u{0}\nname.txt").as_deref(), Some("badname.txt"));
        assert_eq!(sanitize_filename("  two   words.txt ").as_deref(), Some("two_words.txt"));
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename("uploads/"), None);
        assert_eq!(sanitize_filename(""), None);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        assert_eq!(rejection(policy().validate("../", None, 10)), Rejection::EmptyFilename);
    }

    #[test]
    fn test_content_types() {
        let upload = policy().validate("a.txt", None, 1).unwrap();
        assert_eq!(upload.content_type, DEFAULT_CONTENT_TYPE);

        let upload = policy().validate("a.txt", Some("Text/Plain; charset=utf-8"), 1).unwrap();
        assert_eq!(upload.content_type, "text/plain; charset=utf-8");

        assert!(matches!(
            rejection(policy().validate("a.txt", Some("garbage"), 1)),
            Rejection::InvalidContentType(_)
        ));

        let images_only = policy().with_content_types(vec!["image/*".into()]);
        assert!(images_only.validate("a.png", Some("image/png"), 1).is_ok());
        assert!(matches!(
            rejection(images_only.validate("a.pdf", Some("application/pdf"), 1)),
            Rejection::ContentTypeNotAllowed(_)
        ));
    }

    #[test]
    fn test_long_names_are_cut_keeping_extension() {
        let long = format!("{}.txt", "a".repeat(232));
        let upload = policy().validate(&long, None, 10).unwrap();
        assert_eq!(upload.sanitized_filename.len(), MAX_FILENAME_BYTES);
        assert!(upload.sanitized_filename.ends_with(".txt"));
        assert_eq!(upload.extension, "txt");
        assert_eq!(upload.original_filename, long);

        // Multi-byte characters are never split
        let wide = format!("{}.pdf", "é".repeat(150));
        let name = sanitize_filename(&wide).unwrap();
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert!(name.ends_with(".pdf"));

        let short = "x".repeat(MAX_FILENAME_BYTES - 4) + ".txt";
        assert_eq!(sanitize_filename(&short).as_deref(), Some(short.as_str()));
    }

    #[test]
    fn test_validate_matches_extensions_case_insensitively() {
        let allowed: HashSet<String> = ["PDF".to_string(), ".Txt".to_string()].into_iter().collect();
        assert!(validate("report.pdf", None, 1, &allowed, 10).is_ok());
        assert!(validate("notes.TXT", None, 1, &allowed, 10).is_ok());
        assert!(matches!(
            validate("run.exe", None, 1, &allowed, 10),
            Err(ShareError::Validation(Rejection::ExtensionNotAllowed(_)))
        ));
    }

    #[test]
    fn test_policy_normalizes_extensions() {
        let policy = UploadPolicy::new([" .PDF", "Txt", ""], 10);
        assert!(policy.allowed_extensions.contains("pdf"));
        assert!(policy.allowed_extensions.contains("txt"));
        assert_eq!(policy.allowed_extensions.len(), 2);
    }
}
