const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Markers after which a credential value follows.
const SECRET_MARKERS: [&str; 5] = ["AIza", "key=", "ya29.", "\"key\":\"", "x-goog-api-key: "];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn redact_after(input: &str, marker: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(marker) {
        let value_start = pos + marker.len();
        let value_len: usize = rest[value_start..]
            .chars()
            .take_while(|c| is_secret_char(*c))
            .map(char::len_utf8)
            .sum();

        if value_len == 0 {
            out.push_str(&rest[..value_start]);
        } else {
            out.push_str(&rest[..pos]);
            out.push_str(REDACTED);
        }
        rest = &rest[value_start + value_len..];
    }

    out.push_str(rest);
    out
}

/// Redact Google credentials from provider error text and cap its length.
///
/// The result is safe to log and to return to callers.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = SECRET_MARKERS
        .iter()
        .fold(input.to_string(), |text, marker| redact_after(&text, marker));

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let truncated: String = scrubbed.chars().take(MAX_API_ERROR_CHARS).collect();
    format!("{truncated}...")
}
