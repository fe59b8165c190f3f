//! Container id generation and name validation.

use crate::error::{HuskError, HuskResult};

/// Number of digits in a generated container id.
pub const ID_LENGTH: usize = 10;

/// Maximum length of a container name.
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum length of an image name.
pub const MAX_IMAGE_NAME_LENGTH: usize = 128;

/// Generate a new random container id.
///
/// The id is a 10-digit decimal string derived from a UUID v4, so it can also
/// serve as the default container name.
#[must_use]
pub fn generate_container_id() -> String {
    let modulus = 10u128.pow(ID_LENGTH as u32);
    let value = uuid::Uuid::new_v4().as_u128() % modulus;
    format!("{value:0width$}", width = ID_LENGTH)
}

/// Validate a container name.
///
/// Names are used as directory names on disk, so they must:
/// - Be 1-64 characters long
/// - Contain only alphanumeric characters, hyphens, and underscores
/// - Start with an alphanumeric character
pub fn validate_name(name: &str) -> HuskResult<()> {
    let invalid = || HuskError::InvalidContainerName {
        name: name.to_string(),
    };

    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(invalid());
    }

    match name.chars().next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return Err(invalid()),
    }

    if name
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
    {
        return Err(invalid());
    }

    Ok(())
}

/// Validate an image name.
///
/// The name selects `<images>/<name>.tar` and `<images>/<name>/`, so it must be
/// a single plain file name: 1-128 characters of alphanumerics, `.`, `-` and
/// `_`, starting with an alphanumeric character.
pub fn validate_image_name(name: &str) -> HuskResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_IMAGE_NAME_LENGTH
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(HuskError::InvalidImageName {
            name: name.to_string(),
        })
    }
}
