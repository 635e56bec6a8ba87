//! JSON users-file encoding shared by the file-based backends.

use std::collections::BTreeMap;

use super::{StoreError, UserRecord};

/// The whole users file: username to record.
pub type UserMap = BTreeMap<String, UserRecord>;

/// Decode a users file.
///
/// Empty or whitespace-only content is an empty map.
///
/// # Errors
///
/// Returns `StoreError::DataCorruption` if the content is not a valid users file.
pub fn decode(content: &str) -> Result<UserMap, StoreError> {
    if content.trim().is_empty() {
        return Ok(UserMap::new());
    }

    serde_json::from_str(content)
        .map_err(|e| StoreError::DataCorruption(format!("invalid users file: {e}")))
}

/// Encode a users file as pretty-printed JSON with a trailing newline.
///
/// # Errors
///
/// Returns `StoreError::DataCorruption` if serialization fails.
pub fn encode(users: &UserMap) -> Result<String, StoreError> {
    let mut content = serde_json::to_string_pretty(users)
        .map_err(|e| StoreError::DataCorruption(format!("failed to serialize users: {e}")))?;
    content.push('\n');
    Ok(content)
}
