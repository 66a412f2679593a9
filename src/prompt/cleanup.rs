use regex::Regex;
use std::sync::LazyLock;

// Lead-in paragraphs the model tends to prepend despite being told not to.
// Evaluated in order; only the first match is stripped.
static PREAMBLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(?:Okay|Sure|Here|I've).*?(?:refined|enhanced|improved|modified|updated|adapted|created|generated|written).*?prompt.*?\n\n",
        r"(?i)^(?:Here's|The following is|I've created|This is).*?(?:the refined|an enhanced|the improved).*?prompt.*?\n\n",
        r"(?i)^(?:Based on|Incorporating|Adding|With|The).*?(?:input|feedback|context|additional information).*?\n\n",
        r"(?i)^(?:Note:|Note that).*?\n\n",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("preamble pattern is valid"))
    .collect()
});

/// Remove a leading explanatory paragraph such as "Here's the refined prompt:".
/// Text with no recognised preamble is returned unchanged.
pub fn strip_preamble(text: &str) -> String {
    match PREAMBLE_PATTERNS.iter().find(|pattern| pattern.is_match(text)) {
        Some(pattern) => pattern.replacen(text, 1, "").trim().to_string(),
        None => text.to_string(),
    }
}
