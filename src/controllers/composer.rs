use tracing::debug;

use super::attachment::{self, AttachmentError};

/// Delimiter block under which uploaded file content is appended to the
/// outgoing message text.
pub const FILE_DELIMITER: &str = "--- Uploaded File ---";

/// A file selected by the user but not yet sent.
#[derive(Debug, Clone)]
pub struct StagedAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl StagedAttachment {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The inline representation embedded into message text. Text content is
    /// decoded as UTF-8; spreadsheet content is not decoded, only described.
    fn inline_content(&self) -> String {
        if attachment::is_text(&self.mime_type, &self.file_name) {
            match std::str::from_utf8(&self.bytes) {
                Ok(text) => text.to_string(),
                Err(_) => format!("[File: {} - Error reading content]", self.file_name),
            }
        } else {
            format!(
                "[Excel File: {}, Size: {:.2}KB]",
                self.file_name,
                self.bytes.len() as f64 / 1024.0
            )
        }
    }
}

/// Transient composer state: the draft text and at most one staged file.
///
/// The draft is written back here when a send fails, so typed input is
/// never silently lost.
#[derive(Debug, Default)]
pub struct ComposerState {
    pub draft: String,
    attachment: Option<StagedAttachment>,
}

impl ComposerState {
    /// Stage a file, replacing any previously staged one. Validation happens
    /// here; nothing is staged on failure.
    pub fn stage(&mut self, file: StagedAttachment) -> Result<(), AttachmentError> {
        attachment::validate_attachment(&file.file_name, &file.mime_type, file.size())?;
        debug!(file_name = %file.file_name, size = file.size(), "Staged attachment");
        self.attachment = Some(file);
        Ok(())
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }

    pub fn attachment(&self) -> Option<&StagedAttachment> {
        self.attachment.as_ref()
    }

    pub fn has_attachment(&self) -> bool {
        self.attachment.is_some()
    }

    /// Combine typed text with the staged file under the delimiter block.
    pub fn compose(&self, text: &str) -> String {
        match &self.attachment {
            None => text.to_string(),
            Some(file) => {
                let content = file.inline_content();
                if text.is_empty() {
                    format!("{FILE_DELIMITER}\n{content}")
                } else {
                    format!("{text}\n\n{FILE_DELIMITER}\n{content}")
                }
            }
        }
    }
}
