// Log sanitization
//
// Upstream error bodies can echo back whatever the caller sent, so anything
// destined for a log line or an error payload is scrubbed first.

/// Strip email, URL, and phone shapes from an error message and truncate it.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    if let Ok(re) = regex::Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}") {
        sanitized = re.replace_all(&sanitized, "[REDACTED_EMAIL]").to_string();
    }

    if let Ok(re) = regex::Regex::new(r"https?://[^\s]+") {
        sanitized = re.replace_all(&sanitized, "[REDACTED_URL]").to_string();
    }

    if let Ok(re) = regex::Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b") {
        sanitized = re.replace_all(&sanitized, "[REDACTED_PHONE]").to_string();
    }

    if sanitized.chars().count() > 200 {
        let truncated: String = sanitized.chars().take(200).collect();
        sanitized = format!("{}...[truncated]", truncated);
    }

    sanitized
}
