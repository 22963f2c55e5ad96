//! Extraction of Jira issue keys from test names.

use std::sync::LazyLock;

use regex::Regex;

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]+)[_-]([0-9]+)").expect("key pattern is valid"));

/// Returns the issue key a test name starts with, if any.
///
/// `PROJ_123_should_login` and `PROJ-123 should login` both yield `PROJ-123`.
pub fn issue_key(test_name: &str) -> Option<String> {
    let caps = KEY_PATTERN.captures(test_name)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore_separator_normalized() {
        assert_eq!(issue_key("PROJ_123_should_login").as_deref(), Some("PROJ-123"));
    }

    #[test]
    fn test_dash_separator_kept() {
        assert_eq!(issue_key("PROJ-123").as_deref(), Some("PROJ-123"));
        assert_eq!(issue_key("AB-7 logs in with SSO").as_deref(), Some("AB-7"));
    }

    #[test]
    fn test_suffix_ignored() {
        assert_eq!(issue_key("X_1abc").as_deref(), Some("X-1"));
    }

    #[test]
    fn test_non_matching_names_dropped() {
        for name in [
            "",
            "should_login",
            "proj_123",
            "Proj-123",
            "PROJ123",
            "PROJ-",
            "PROJ.123",
            " PROJ-123",
            "123-PROJ",
        ] {
            assert_eq!(issue_key(name), None, "{name:?} should not match");
        }
    }
}
