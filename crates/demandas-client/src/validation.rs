//! Local pre-flight checks. Nothing here touches the network.

use chrono::NaiveDate;

/// 10 MiB.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("email must not be empty")]
    EmptyEmail,
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("required field missing: {0}")]
    MissingField(&'static str),
    #[error("at least one target school is required")]
    NoSchools,
    #[error("deadline {deadline} is earlier than today ({today})")]
    DeadlineInPast { deadline: NaiveDate, today: NaiveDate },
    #[error("file name must not be empty")]
    EmptyFileName,
    #[error("file is empty")]
    EmptyFile,
    #[error("file has {size} bytes; the limit is {max} bytes")]
    FileTooLarge { size: usize, max: usize },
    #[error("demand id must not be empty")]
    EmptyDemandId,
    #[error("update must change at least one field")]
    EmptyPatch,
    #[error("unknown demand status: {0}")]
    UnknownStatus(String),
}

/// Accepts the `local@domain.tld` shape: one `@`, no whitespace, and a dot in the
/// domain with text on both sides.
pub fn validate_email(raw: &str) -> Result<(), ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyEmail);
    }
    let invalid = || ValidationError::InvalidEmail(trimmed.to_string());

    if trimmed.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = trimmed.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let has_inner_dot = domain
        .match_indices('.')
        .any(|(index, _)| index > 0 && index + 1 < domain.len());
    if !has_inner_dot {
        return Err(invalid());
    }
    Ok(())
}

pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    validate_email(raw)?;
    Ok(raw.trim().to_lowercase())
}

pub fn require_text(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Dates compare by calendar day only, so a deadline of today is accepted.
pub fn validate_deadline(
    deadline: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<NaiveDate, ValidationError> {
    let deadline = deadline.ok_or(ValidationError::MissingField("prazo"))?;
    if deadline < today {
        return Err(ValidationError::DeadlineInPast { deadline, today });
    }
    Ok(deadline)
}

pub fn validate_upload(name: &str, size: usize) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyFileName);
    }
    if size == 0 {
        return Err(ValidationError::EmptyFile);
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::FileTooLarge {
            size,
            max: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}
