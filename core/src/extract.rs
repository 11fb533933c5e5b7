//! Human-readable error text from Jenkins error responses.
//!
//! JSON errors carry a `message` field. HTML error pages put the text in a
//! `<div id="error-description">` element. The JSON field wins; the HTML search
//! runs only when there is no such field.

use std::sync::LazyLock;

use regex::Regex;

static ERROR_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div id="error-description">.*?</div>"#).expect("valid regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Extract the server's error message from a response body, if any.
pub fn extract_error_message(body: &str) -> Option<String> {
    if let Some(message) = json_message(body) {
        return Some(message);
    }
    let fragment = ERROR_DESCRIPTION.find(body)?.as_str();
    let text = TAG.replace_all(fragment, "");
    let text: String = text.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn json_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_message_field() {
        assert_eq!(
            extract_error_message(r#"{"message":"Bad request"}"#).as_deref(),
            Some("Bad request")
        );
    }

    #[test]
    fn message_field_wins_over_html_inside_json() {
        let body = r#"{"message":"A job already exists","html":"<div id=\"error-description\">other</div>"}"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("A job already exists"));
    }

    #[test]
    fn falls_back_to_error_description() {
        let body = r#"<html><body><div id="error-description">Invalid token</div></body></html>"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("Invalid token"));
    }

    #[test]
    fn strips_nested_tags_and_newlines() {
        let body = "<html><div id=\"error-description\">\r\n<h2>No valid crumb</h2>\n<p> was included in the request</p>\n</div></html>";
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("No valid crumb was included in the request")
        );
    }

    #[test]
    fn no_match_is_absent() {
        assert_eq!(extract_error_message("<html><body>Oops</body></html>"), None);
        assert_eq!(extract_error_message(""), None);
        assert_eq!(extract_error_message(r#"{"status":500}"#), None);
        assert_eq!(extract_error_message(r#"<div id="error-description"></div>"#), None);
    }

    #[test]
    fn non_string_message_falls_through() {
        assert_eq!(extract_error_message(r#"{"message":42}"#), None);
    }
}
