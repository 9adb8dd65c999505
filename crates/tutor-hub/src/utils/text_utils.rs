//! Text helpers for titles, search filters and reply parsing

use regex::Regex;
use lazy_static::lazy_static;

lazy_static! {
    // "HINT:" anywhere, or "Hint:" opening a line
    static ref HINT_MARKER_REGEX: Regex = Regex::new(r"HINT:|(?m)^[ \t]*Hint:").expect("static regex");
}

/// Titles that mean "nobody picked a name yet".
const PLACEHOLDER_TITLES: &[&str] = &["unknown", "n/a", "new conversation", "untitled"];

pub struct TextUtils;

impl TextUtils {
    /// Case-insensitive substring test. An empty pattern matches everything.
    pub fn contains_ignore_case(text: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return true;
        }
        text.to_lowercase().contains(&pattern.to_lowercase())
    }

    /// Case-insensitive equality, used for exact tag matches such as CEFR levels.
    pub fn equals_ignore_case(a: &str, b: &str) -> bool {
        a.to_uppercase() == b.to_uppercase()
    }

    pub fn is_placeholder_title(title: Option<&str>) -> bool {
        match title.map(str::trim) {
            None | Some("") => true,
            Some(t) => PLACEHOLDER_TITLES.contains(&t.to_lowercase().as_str()),
        }
    }

    /// Split a free-form tutor reply into `(reply, hint)` at the first hint marker.
    pub fn split_hint(text: &str) -> (String, Option<String>) {
        match HINT_MARKER_REGEX.find(text) {
            Some(m) => {
                let reply = text[..m.start()].trim().to_string();
                let hint = text[m.end()..].trim().to_string();
                (reply, if hint.is_empty() { None } else { Some(hint) })
            }
            None => (text.trim().to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_ignore_case() {
        assert!(TextUtils::contains_ignore_case("Travel Talk", "travel"));
        assert!(TextUtils::contains_ignore_case("Travel Talk", ""));
        assert!(!TextUtils::contains_ignore_case("Math Basics", "travel"));
    }

    #[test]
    fn test_equals_ignore_case() {
        assert!(TextUtils::equals_ignore_case("b1", "B1"));
        assert!(!TextUtils::equals_ignore_case("B1", "B2"));
    }

    #[test]
    fn test_placeholder_titles() {
        assert!(TextUtils::is_placeholder_title(None));
        assert!(TextUtils::is_placeholder_title(Some("   ")));
        assert!(TextUtils::is_placeholder_title(Some("Unknown")));
        assert!(TextUtils::is_placeholder_title(Some("New Conversation")));
        assert!(!TextUtils::is_placeholder_title(Some("Airport small talk")));
    }

    #[test]
    fn test_split_hint_uppercase_marker() {
        let (reply, hint) = TextUtils::split_hint("Great answer! Where did you go? HINT: Name a city.");
        assert_eq!(reply, "Great answer! Where did you go?");
        assert_eq!(hint.as_deref(), Some("Name a city."));
    }

    #[test]
    fn test_split_hint_line_marker() {
        let (reply, hint) = TextUtils::split_hint("Nice.\nHint: Talk about the weather.");
        assert_eq!(reply, "Nice.");
        assert_eq!(hint.as_deref(), Some("Talk about the weather."));
    }

    #[test]
    fn test_split_hint_without_marker() {
        let (reply, hint) = TextUtils::split_hint("  Just a reply.  ");
        assert_eq!(reply, "Just a reply.");
        assert!(hint.is_none());
    }
}
