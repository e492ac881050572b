// agentgate-gateway/src/validation.rs
// ============================================================================
// Module: Request Validation
// Description: Structural checks on an incoming tool-call request.
// Purpose: Reject malformed identifiers before any other pipeline stage runs.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! `session_id` must be non-empty and at most 256 characters. `tool_name`
//! must be non-empty, at most 128 characters, match `[A-Za-z0-9_.-]+`, and
//! must not contain `..`.

const MAX_SESSION_ID_LEN: usize = 256;
const MAX_TOOL_NAME_LEN: usize = 128;

fn is_tool_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'
}

/// Returns `true` when `tool_name` satisfies the tool-name invariant.
#[must_use]
pub fn is_valid_tool_name(tool_name: &str) -> bool {
    !tool_name.is_empty() && tool_name.chars().count() <= MAX_TOOL_NAME_LEN && tool_name.chars().all(is_tool_name_char) && !tool_name.contains("..")
}

/// Returns `true` when `session_id` satisfies the session-id invariant.
#[must_use]
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty() && session_id.chars().count() <= MAX_SESSION_ID_LEN
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn plain_tool_names_are_valid() {
        assert!(is_valid_tool_name("db_query"));
        assert!(is_valid_tool_name("send.email-v2"));
    }

    #[test]
    fn empty_tool_name_is_invalid() {
        assert!(!is_valid_tool_name(""));
    }

    #[test]
    fn path_traversal_attempt_is_invalid() {
        assert!(!is_valid_tool_name("read_file/../etc/passwd"));
        assert!(!is_valid_tool_name(".."));
    }

    #[test]
    fn disallowed_characters_are_invalid() {
        assert!(!is_valid_tool_name("db query"));
        assert!(!is_valid_tool_name("db/query"));
    }

    #[test]
    fn overlong_tool_name_is_invalid() {
        let name = "a".repeat(129);
        assert!(!is_valid_tool_name(&name));
    }

    #[test]
    fn session_id_bounds_are_enforced() {
        assert!(is_valid_session_id("s1"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id(&"s".repeat(257)));
    }
}
