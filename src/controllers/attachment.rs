//! Attachment validation for the message composer.
//!
//! Files are checked against the allow-list by extension OR declared MIME
//! type (either match is sufficient) and against the size ceiling before
//! they are staged.

use thiserror::Error;

/// 5 MB ceiling, applied uniformly at every staging call site.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

pub const ALLOWED_EXTENSIONS: &[&str] = &["txt", "csv", "xls", "xlsx"];
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("Only TXT, CSV, and Excel files are allowed (got {file_name:?})")]
    UnsupportedType { file_name: String },

    #[error("File is {size} bytes, the limit is {max}")]
    TooLarge { size: u64, max: u64 },
}

/// Validate a file before staging it on the composer.
pub fn validate_attachment(
    file_name: &str,
    mime_type: &str,
    size: u64,
) -> Result<(), AttachmentError> {
    let extension_ok = extension_of(file_name)
        .map(|ext| is_allowed_extension(&ext))
        .unwrap_or(false);

    if !extension_ok && !is_allowed_mime(mime_type) {
        return Err(AttachmentError::UnsupportedType {
            file_name: file_name.to_string(),
        });
    }

    if size > MAX_FILE_SIZE {
        return Err(AttachmentError::TooLarge {
            size,
            max: MAX_FILE_SIZE,
        });
    }

    Ok(())
}

/// Lowercased extension of a file name, if it has one.
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

pub fn is_allowed_mime(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// Whether the file's content can be inlined as text. Spreadsheets cannot;
/// they get a descriptive placeholder instead.
pub fn is_text(mime_type: &str, file_name: &str) -> bool {
    if mime_type == "text/plain" || mime_type == "text/csv" {
        return true;
    }
    matches!(extension_of(file_name).as_deref(), Some("txt") | Some("csv"))
}

/// Human-readable size, as shown next to the staged file.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
