//! Message-key catalog.
//!
//! Operations are identified by a message key such as `Operation_Cleanup`.
//! The key resolves to a human-readable name (shown in progress labels and
//! console markers) and to a short error template used when a step fails.
//! `{0}` in a template is replaced with the resource the failure is scoped to.

use crate::error::Error;

pub const CREATE_REMOTE_FOLDER: &str = "Operation_CreateRemoteFolder";
pub const CHECKOUT: &str = "Operation_CheckOut";
pub const UPDATE: &str = "Operation_Update";
pub const SWITCH: &str = "Operation_Switch";
pub const COMMIT: &str = "Operation_Commit";
pub const CLEANUP: &str = "Operation_Cleanup";
pub const RELOCATE: &str = "Operation_Relocate";
pub const SET_PROPERTIES: &str = "Operation_SetProperties";
pub const REMOVE_PROPERTIES: &str = "Operation_RemoveProperties";
pub const LOCK: &str = "Operation_Lock";
pub const UNLOCK: &str = "Operation_Unlock";
pub const REVERT: &str = "Operation_Revert";
pub const COMPOSITE: &str = "Operation_Composite";

// (key, name, error template)
const CATALOG: &[(&str, &str, &str)] = &[
    (
        CREATE_REMOTE_FOLDER,
        "Create Remote Folder",
        "Failed to create remote folder {0}",
    ),
    (CHECKOUT, "Check Out", "Failed to check out {0}"),
    (UPDATE, "Update", "Failed to update {0}"),
    (SWITCH, "Switch", "Failed to switch {0}"),
    (COMMIT, "Commit", "Failed to commit {0}"),
    (CLEANUP, "Cleanup", "Cleanup failed for {0}"),
    (RELOCATE, "Relocate", "Failed to relocate {0}"),
    (SET_PROPERTIES, "Set Properties", "Failed to set properties on {0}"),
    (
        REMOVE_PROPERTIES,
        "Remove Properties",
        "Failed to remove properties from {0}",
    ),
    (LOCK, "Lock", "Failed to lock {0}"),
    (UNLOCK, "Unlock", "Failed to unlock {0}"),
    (REVERT, "Revert", "Failed to revert {0}"),
    (COMPOSITE, "Composite Operation", "Composite operation failed on {0}"),
];

fn lookup(key: &str) -> Option<(&'static str, &'static str)> {
    CATALOG
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, name, template)| (*name, *template))
}

/// Returns the human-readable name for `key`, or the key itself if unknown.
pub fn operation_name(key: &str) -> String {
    lookup(key)
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Builds the short, user-facing message for a failure of `key`.
pub fn short_error_message(key: &str, resource: Option<&str>, cause: &Error) -> String {
    let name = operation_name(key);
    if cause.is_cancellation() {
        return format!("{} cancelled", name);
    }
    match (resource, lookup(key)) {
        (Some(resource), Some((_, template))) => template.replace("{0}", resource),
        (Some(resource), None) => format!("{} failed for {}", name, resource),
        (None, _) => format!("{} failed", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_name_lookup() {
        assert_eq!(operation_name(CLEANUP), "Cleanup");
        assert_eq!(operation_name(CREATE_REMOTE_FOLDER), "Create Remote Folder");
        assert_eq!(operation_name("Operation_Unknown"), "Operation_Unknown");
    }

    #[test]
    fn test_short_error_message_substitutes_resource() {
        let cause = Error::connector("cleanup", "/wc/b", "locked");
        assert_eq!(
            short_error_message(CLEANUP, Some("/wc/b"), &cause),
            "Cleanup failed for /wc/b"
        );
        assert_eq!(short_error_message(CLEANUP, None, &cause), "Cleanup failed");
        assert_eq!(
            short_error_message("Operation_Custom", Some("x"), &cause),
            "Operation_Custom failed for x"
        );
    }

    #[test]
    fn test_short_error_message_for_cancellation() {
        let cause = Error::cancelled("user");
        assert_eq!(
            short_error_message(UPDATE, Some("/wc/a"), &cause),
            "Update cancelled"
        );
    }

    #[test]
    fn test_every_key_has_a_template_placeholder() {
        for (key, _, template) in CATALOG {
            assert!(template.contains("{0}"), "{} template lacks {{0}}", key);
        }
    }
}
