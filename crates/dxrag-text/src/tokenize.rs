use regex::Regex;
use std::sync::OnceLock;

// Hyphenated clinical terms ("anti-NMDA") and alphanumeric codes stay whole.
const TOKEN_PATTERN: &str = r"[a-z0-9][\w\-]*[a-z0-9]|[a-z0-9]";

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TOKEN_PATTERN).unwrap_or_else(|e| unreachable!("static pattern: {e}")))
}

/// Lowercase `text` and return its tokens in order, repeats included.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_regex().find_iter(&lowered).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::tokenize;

    #[test]
    fn keeps_hyphenated_terms() {
        assert_eq!(tokenize("Anti-NMDA receptor encephalitis"), vec!["anti-nmda", "receptor", "encephalitis"]);
    }

    #[test]
    fn keeps_codes_and_single_characters() {
        assert_eq!(tokenize("HbA1c of 7 (ICD-10 E11)"), vec!["hba1c", "of", "7", "icd-10", "e11"]);
    }

    #[test]
    fn strips_trailing_punctuation_and_hyphens() {
        assert_eq!(tokenize("fever, cough -- dyspnea-"), vec!["fever", "cough", "dyspnea"]);
    }
}
