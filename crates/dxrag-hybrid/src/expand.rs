//! Multi-query expansion keyed on body-system trigger words.

/// Upper bound on variants handed to retrieval, including the verbatim query.
pub const MAX_VARIANTS: usize = 5;

/// Characters of the input reused in each derived variant.
pub const PREFIX_CHARS: usize = 100;

/// Body systems in priority order with their substring triggers (lowercase).
pub const SYSTEM_TRIGGERS: &[(&str, &[&str])] = &[
    ("respiratory", &["cough", "sputum", "dyspnea", "breath", "wheez", "chest", "pneumon", "bronch"]),
    ("cardiovascular", &["chest pain", "palpitat", "hypertens", "blood pressure", "tachycard", "bradycard", "syncope", "edema"]),
    ("gastrointestinal", &["nausea", "vomit", "diarrhea", "abdomin", "bowel", "constipat", "dysphagia", "jaundice"]),
    ("neurological", &["headache", "dizz", "seizure", "numbness", "weakness", "confus", "altered mental", "stroke"]),
    ("urinary", &["dysuria", "hematuria", "frequen", "urinat", "flank pain", "suprapubic"]),
    ("musculoskeletal", &["joint", "pain", "stiffness", "swelling", "arthri", "back pain"]),
    ("dermatological", &["rash", "lesion", "itch", "skin", "erythem", "pustul"]),
    ("infectious", &["fever", "chills", "rigors", "sepsis", "infection"]),
    ("endocrine", &["thirst", "polyuria", "weight loss", "weight gain", "fatigue", "thyroid", "diabet"]),
    ("psychiatric", &["anxiety", "depression", "insomnia", "agitat", "hallucinat", "suicid"]),
];

/// Derive up to [`MAX_VARIANTS`] retrieval queries from a symptom description.
///
/// The first entry is always `symptoms` verbatim. Then one `"<system> <prefix>"`
/// per matching body system, then `"treatment <prefix>"` and
/// `"differential diagnosis <prefix>"`, truncated to the cap.
pub fn expand(symptoms: &str) -> Vec<String> {
    let lowered = symptoms.to_lowercase();
    let prefix: String = symptoms.chars().take(PREFIX_CHARS).collect();

    let mut variants = vec![symptoms.to_string()];
    for (system, triggers) in SYSTEM_TRIGGERS {
        if triggers.iter().any(|t| lowered.contains(t)) {
            variants.push(format!("{system} {prefix}"));
        }
    }
    variants.push(format!("treatment {prefix}"));
    variants.push(format!("differential diagnosis {prefix}"));
    variants.truncate(MAX_VARIANTS);
    variants
}
