//! Input checks applied before any state is created.
//!
//! Everything here is pure: no I/O, no clock access except through
//! [`generate_storage_path`], which reads the current date.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Datelike, Utc};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// MIME types accepted for upload.
pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "application/pdf"];

/// Upper bound on a single upload (50 MiB).
pub const MAX_FILE_SIZE: i64 = 50 * 1024 * 1024;

/// Longest filename we store, in UTF-8 bytes.
pub const MAX_FILENAME_BYTES: usize = 255;

/// Longest single path component the object directory accepts.
const MAX_PATH_COMPONENT_BYTES: usize = 255;

/// `{asset_id}-` prefix of the last storage path component.
const ASSET_PREFIX_BYTES: usize = 37;

/// Extensions longer than this are treated as part of the stem when truncating.
const MAX_EXTENSION_BYTES: usize = 32;

const SHA256_HEX_LEN: usize = 64;

pub fn validate_mime_type(mime: &str) -> AppResult<()> {
    if ALLOWED_MIME_TYPES.contains(&mime) {
        Ok(())
    } else {
        Err(AppError::invalid(format!("unsupported MIME type `{mime}`")))
    }
}

pub fn validate_file_size(size: i64) -> AppResult<()> {
    if size <= 0 {
        return Err(AppError::invalid("file is empty"));
    }
    if size > MAX_FILE_SIZE {
        return Err(AppError::invalid(format!(
            "file is {size} bytes; the limit is {MAX_FILE_SIZE}"
        )));
    }
    Ok(())
}

/// Client digests must be hex-encoded SHA-256 values; case is ignored.
pub fn validate_digest(digest: &str) -> AppResult<()> {
    if digest.len() != SHA256_HEX_LEN || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::invalid(
            "digest must be 64 hexadecimal characters",
        ));
    }
    Ok(())
}

/// Turn an arbitrary user-supplied name into a safe display/storage name.
///
/// Steps, in order:
/// 1. NFC normalization
/// 2. drop control characters
/// 3. drop `/` and `\`
/// 4. drop `..` until none remain
/// 5. trim leading/trailing dots and whitespace
/// 6. truncate to [`MAX_FILENAME_BYTES`], keeping the extension
///
/// Fails only when the input is empty or nothing survives.
pub fn sanitize_filename(name: &str) -> AppResult<String> {
    if name.is_empty() {
        return Err(AppError::invalid("filename is required"));
    }

    let mut cleaned: String = name
        .nfc()
        .filter(|c| !c.is_control() && *c != '/' && *c != '\\')
        .collect();
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", "");
    }

    let trimmed = trim_name(&cleaned);
    if trimmed.is_empty() {
        return Err(AppError::invalid(format!(
            "filename `{}` is empty after sanitization",
            name.escape_debug()
        )));
    }

    Ok(truncate_preserving_extension(trimmed, MAX_FILENAME_BYTES))
}

fn trim_name(s: &str) -> &str {
    s.trim_matches(|c: char| c == '.' || c.is_whitespace())
}

fn truncate_preserving_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let extension = name
        .rfind('.')
        .filter(|&idx| idx > 0 && name.len() - idx <= MAX_EXTENSION_BYTES)
        .map(|idx| &name[idx..]);

    match extension {
        Some(ext) => {
            let stem = &name[..name.len() - ext.len()];
            let stem = truncate_at_char_boundary(stem, max_bytes - ext.len());
            // The stem must not end in a dot, or it would merge with the extension's.
            let stem = trim_name(stem);
            format!("{stem}{ext}")
        }
        None => trim_name(truncate_at_char_boundary(name, max_bytes)).to_string(),
    }
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Storage location for an asset, using today's date.
///
/// `filename` must already have passed through [`sanitize_filename`].
pub fn generate_storage_path(owner_id: Uuid, asset_id: Uuid, filename: &str) -> String {
    storage_path_at(owner_id, asset_id, filename, Utc::now())
}

/// Storage location for an asset created at `at`.
///
/// The filename segment is shortened, extension kept, so that
/// `{asset_id}-{filename}` fits in one path component. The asset's display
/// name is unaffected.
pub fn storage_path_at(owner_id: Uuid, asset_id: Uuid, filename: &str, at: DateTime<Utc>) -> String {
    let segment = truncate_preserving_extension(
        filename,
        MAX_PATH_COMPONENT_BYTES - ASSET_PREFIX_BYTES,
    );
    format!(
        "{}/{:04}/{:02}/{}-{}",
        owner_id,
        at.year(),
        at.month(),
        asset_id,
        segment
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mime_allow_list() {
        for mime in ALLOWED_MIME_TYPES {
            assert!(validate_mime_type(mime).is_ok());
        }
        assert!(validate_mime_type("image/gif").is_err());
        assert!(validate_mime_type("IMAGE/JPEG").is_err());
        assert!(validate_mime_type("").is_err());
    }

    #[test]
    fn test_size_bounds() {
        assert!(validate_file_size(0).is_err());
        assert!(validate_file_size(-1).is_err());
        assert!(validate_file_size(1).is_ok());
        assert!(validate_file_size(MAX_FILE_SIZE).is_ok());
        assert!(validate_file_size(MAX_FILE_SIZE + 1).is_err());
    }

    #[test]
    fn test_digest_format() {
        assert!(validate_digest(&"a".repeat(64)).is_ok());
        assert!(validate_digest(&"F".repeat(64)).is_ok());
        assert!(validate_digest(&"ab".repeat(33)).is_err());
        assert!(validate_digest("abc123").is_err());
        assert!(validate_digest(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_sanitize_plain_name_unchanged() {
        assert_eq!(sanitize_filename("photo.jpg").unwrap(), "photo.jpg");
        assert_eq!(sanitize_filename("my report v2.pdf").unwrap(), "my report v2.pdf");
    }

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "etcpasswd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini").unwrap(), "boot.ini");
        assert_eq!(sanitize_filename("a/..../b.png").unwrap(), "ab.png");
    }

    #[test]
    fn test_sanitize_trims_dots_and_whitespace() {
        assert_eq!(sanitize_filename("  .hidden.png. ").unwrap(), "hidden.png");
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_filename("a\u{0}b\nc.pdf").unwrap(), "abc.pdf");
    }

    #[test]
    fn test_sanitize_normalizes_to_nfc() {
        // "e" + combining acute accent composes to a single code point.
        let decomposed = "cafe\u{301}.png";
        assert_eq!(sanitize_filename(decomposed).unwrap(), "caf\u{e9}.png");
    }

    #[test]
    fn test_sanitize_rejects_empty_results() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("...").is_err());
        assert!(sanitize_filename(" / \\ ").is_err());
        assert!(sanitize_filename("\u{1}\u{2}").is_err());
    }

    #[test]
    fn test_sanitize_truncates_preserving_extension() {
        let long = format!("{}.pdf", "x".repeat(400));
        let out = sanitize_filename(&long).unwrap();
        assert_eq!(out.len(), MAX_FILENAME_BYTES);
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = format!("{}.png", "\u{e9}".repeat(300));
        let out = sanitize_filename(&long).unwrap();
        assert!(out.len() <= MAX_FILENAME_BYTES);
        assert!(out.ends_with(".png"));
    }

    #[test]
    fn test_sanitize_truncation_never_doubles_dots() {
        let stem = "a.".repeat(200);
        let out = sanitize_filename(&format!("{stem}b.pdf")).unwrap();
        assert!(!out.contains(".."));
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn test_storage_path_layout() {
        let owner = Uuid::nil();
        let asset = Uuid::from_u128(7);
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            storage_path_at(owner, asset, "photo.jpg", at),
            format!("{owner}/2026/03/{asset}-photo.jpg")
        );
    }

    #[test]
    fn test_storage_path_component_fits_filesystem_limit() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let name = sanitize_filename(&format!("{}.png", "x".repeat(300))).unwrap();
        assert_eq!(name.len(), MAX_FILENAME_BYTES);

        let path = storage_path_at(Uuid::nil(), Uuid::from_u128(7), &name, at);
        let last = path.rsplit('/').next().unwrap();
        assert_eq!(last.len(), MAX_PATH_COMPONENT_BYTES);
        assert!(last.ends_with(".png"));
    }

    #[test]
    fn test_generate_storage_path_uses_current_month() {
        let before = Utc::now();
        let path = generate_storage_path(Uuid::nil(), Uuid::from_u128(7), "a.pdf");
        let after = Utc::now();
        let candidates = [before, after].map(|at| storage_path_at(Uuid::nil(), Uuid::from_u128(7), "a.pdf", at));
        assert!(candidates.contains(&path));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn traversal_name() -> impl Strategy<Value = String> {
            proptest::collection::vec(
                prop_oneof![
                    Just("../".to_string()),
                    Just("..\\".to_string()),
                    Just("/".to_string()),
                    Just(".".to_string()),
                    "[a-zA-Z0-9 _-]{0,8}",
                    any::<char>().prop_map(|c| c.to_string()),
                ],
                0..24,
            )
            .prop_map(|parts| parts.concat())
        }

        proptest! {
            #[test]
            fn sanitized_names_never_contain_separators(name in "\\PC*") {
                if let Ok(out) = sanitize_filename(&name) {
                    prop_assert!(!out.contains('/'));
                    prop_assert!(!out.contains('\\'));
                    prop_assert!(!out.contains(".."));
                }
            }

            #[test]
            fn traversal_attempts_are_neutralized(name in traversal_name()) {
                match sanitize_filename(&name) {
                    Ok(out) => {
                        prop_assert!(!out.is_empty());
                        prop_assert!(!out.contains("../"));
                        prop_assert!(!out.contains('/'));
                        prop_assert!(!out.contains('\\'));
                        prop_assert!(!out.starts_with('.'));
                        prop_assert!(!out.ends_with('.'));
                    }
                    Err(err) => prop_assert!(matches!(err, AppError::InvalidInput(_))),
                }
            }

            #[test]
            fn sanitize_is_total_and_bounded(name in any::<String>()) {
                match sanitize_filename(&name) {
                    Ok(out) => {
                        prop_assert!(!out.is_empty());
                        prop_assert!(out.len() <= MAX_FILENAME_BYTES);
                        prop_assert!(!out.chars().any(char::is_control));
                    }
                    Err(err) => prop_assert!(matches!(err, AppError::InvalidInput(_))),
                }
            }

            #[test]
            fn sanitize_is_deterministic(name in any::<String>()) {
                let a = sanitize_filename(&name).ok();
                let b = sanitize_filename(&name).ok();
                prop_assert_eq!(a, b);
            }

            #[test]
            fn size_valid_iff_in_bounds(size in any::<i64>()) {
                prop_assert_eq!(
                    validate_file_size(size).is_ok(),
                    size > 0 && size <= MAX_FILE_SIZE
                );
            }
        }
    }
}
