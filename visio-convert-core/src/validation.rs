//! Pre-flight checks run on a candidate file before any remote call.

use thiserror::Error;

/// Largest accepted upload, in bytes.
pub const MAX_FILE_SIZE: u64 = 1000 * 1024 * 1024;

/// Accepted extensions, lowercase and without the leading dot.
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["vsd", "vsdx"];

/// What the gate needs to know about a file.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub name: &'a str,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: String,
}

impl Validation {
    fn accepted() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.valid {
            Ok(())
        } else {
            Err(ValidationError {
                reason: self.reason.unwrap_or_else(|| "Invalid file".to_string()),
            })
        }
    }
}

pub fn validate(candidate: &Candidate<'_>) -> Validation {
    if candidate.size_bytes > MAX_FILE_SIZE {
        return Validation::rejected(format!(
            "File size too large. Maximum size is {}MB",
            MAX_FILE_SIZE / (1024 * 1024)
        ));
    }

    let extension = extension_of(candidate.name);
    let allowed = ALLOWED_EXTENSIONS.contains(&extension.as_str());
    if !allowed {
        return Validation::rejected(
            "Invalid file type. Only .vsd and .vsdx files are allowed".to_string(),
        );
    }

    Validation::accepted()
}

/// Last dot-delimited segment, lowercased. A name without a dot is its own last segment,
/// matching how the conversion service splits names.
fn extension_of(name: &str) -> String {
    name.rsplit('.').next().unwrap_or_default().to_lowercase()
}
