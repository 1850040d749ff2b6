//! Patient profile and the allow-listed field updates applied to it.

use serde::{Deserialize, Serialize};

use dxrag_core::error::{Error, Result};

/// Rendered in place of the profile when no field is set.
pub const NO_PATIENT_HISTORY: &str = "No patient history provided";

/// What the reasoning prompts know about the patient. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientProfile {
    pub age: Option<u32>,
    pub gender: Option<String>,
    /// Kilograms.
    pub weight: Option<f32>,
    pub conditions: Vec<String>,
    pub allergies: Vec<String>,
    pub medications: Vec<String>,
    pub family_history: Vec<String>,
    pub smoker: Option<bool>,
    pub alcohol_use: Option<String>,
    pub past_surgeries: Vec<String>,
    pub cyp2d6: Option<String>,
    pub cyp2c19: Option<String>,
    pub hla_b5701: Option<bool>,
}

impl PatientProfile {
    /// One `**Label:** value` line per populated field, or [`NO_PATIENT_HISTORY`].
    pub fn render(&self) -> String {
        let mut lines = Vec::new();

        if let Some(age) = self.age.filter(|a| *a > 0) {
            lines.push(format!("**Age:** {age}"));
        }
        if let Some(gender) = non_empty(self.gender.as_deref()) {
            lines.push(format!("**Gender:** {gender}"));
        }
        if let Some(weight) = self.weight.filter(|w| *w > 0.0) {
            lines.push(format!("**Weight:** {weight} kg"));
        }
        push_list(&mut lines, "Existing Conditions", &self.conditions);
        push_list(&mut lines, "⚠️ ALLERGIES", &self.allergies);
        push_list(&mut lines, "Current Medications", &self.medications);
        push_list(&mut lines, "Family History", &self.family_history);
        if let Some(smoker) = self.smoker {
            lines.push(format!("**Smoker:** {}", if smoker { "Yes" } else { "No" }));
        }
        if let Some(alcohol) = non_empty(self.alcohol_use.as_deref()) {
            lines.push(format!("**Alcohol:** {alcohol}"));
        }
        push_list(&mut lines, "Past Surgeries", &self.past_surgeries);

        let mut pgx = Vec::new();
        if let Some(v) = non_empty(self.cyp2d6.as_deref()) {
            pgx.push(format!("CYP2D6: {v}"));
        }
        if let Some(v) = non_empty(self.cyp2c19.as_deref()) {
            pgx.push(format!("CYP2C19: {v}"));
        }
        if let Some(positive) = self.hla_b5701 {
            pgx.push(format!("HLA-B*57:01: {}", if positive { "Positive" } else { "Negative" }));
        }
        if !pgx.is_empty() {
            lines.push(format!("**Pharmacogenomics:** {}", pgx.join(", ")));
        }

        if lines.is_empty() {
            NO_PATIENT_HISTORY.to_string()
        } else {
            lines.join("\n")
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn push_list(lines: &mut Vec<String>, label: &str, items: &[String]) {
    if !items.is_empty() {
        lines.push(format!("**{label}:** {}", items.join(", ")));
    }
}

/// A single validated profile field assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum PatientField {
    Age(u32),
    Gender(Option<String>),
    Weight(f32),
    Conditions(Vec<String>),
    Allergies(Vec<String>),
    Medications(Vec<String>),
    FamilyHistory(Vec<String>),
    Smoker(bool),
    AlcoholUse(Option<String>),
    PastSurgeries(Vec<String>),
    Cyp2d6(Option<String>),
    Cyp2c19(Option<String>),
    HlaB5701(bool),
}

impl PatientField {
    /// Field names accepted by [`PatientField::parse`].
    pub const NAMES: &'static [&'static str] = &[
        "age",
        "gender",
        "weight",
        "conditions",
        "allergies",
        "medications",
        "family_history",
        "smoker",
        "alcohol_use",
        "past_surgeries",
        "cyp2d6",
        "cyp2c19",
        "hla_b5701",
    ];

    /// Parse `value` for the field called `name`. List fields take a
    /// comma-separated string.
    pub fn parse(name: &str, value: &str) -> Result<Self> {
        let field = match name.trim().to_ascii_lowercase().as_str() {
            "age" => Self::Age(
                value.trim().parse().map_err(|_| invalid(name, value, "a whole number of years"))?,
            ),
            "gender" => Self::Gender(text(value)),
            "weight" => {
                let kg: f32 = value
                    .trim()
                    .trim_end_matches("kg")
                    .trim()
                    .parse()
                    .map_err(|_| invalid(name, value, "a weight in kg"))?;
                if !kg.is_finite() || kg <= 0.0 {
                    return Err(invalid(name, value, "a positive weight in kg"));
                }
                Self::Weight(kg)
            }
            "conditions" => Self::Conditions(split_list(value)),
            "allergies" => Self::Allergies(split_list(value)),
            "medications" => Self::Medications(split_list(value)),
            "family_history" => Self::FamilyHistory(split_list(value)),
            "smoker" => Self::Smoker(parse_flag(value).ok_or_else(|| invalid(name, value, "yes or no"))?),
            "alcohol_use" => Self::AlcoholUse(text(value)),
            "past_surgeries" => Self::PastSurgeries(split_list(value)),
            "cyp2d6" => Self::Cyp2d6(text(value)),
            "cyp2c19" => Self::Cyp2c19(text(value)),
            "hla_b5701" => {
                Self::HlaB5701(parse_flag(value).ok_or_else(|| invalid(name, value, "positive or negative"))?)
            }
            _ => {
                return Err(Error::Validation(format!(
                    "unknown patient field '{name}' (expected one of: {})",
                    Self::NAMES.join(", ")
                )))
            }
        };
        Ok(field)
    }

    pub fn apply(self, profile: &mut PatientProfile) {
        match self {
            Self::Age(v) => profile.age = Some(v),
            Self::Gender(v) => profile.gender = v,
            Self::Weight(v) => profile.weight = Some(v),
            Self::Conditions(v) => profile.conditions = v,
            Self::Allergies(v) => profile.allergies = v,
            Self::Medications(v) => profile.medications = v,
            Self::FamilyHistory(v) => profile.family_history = v,
            Self::Smoker(v) => profile.smoker = Some(v),
            Self::AlcoholUse(v) => profile.alcohol_use = v,
            Self::PastSurgeries(v) => profile.past_surgeries = v,
            Self::Cyp2d6(v) => profile.cyp2d6 = v,
            Self::Cyp2c19(v) => profile.cyp2c19 = v,
            Self::HlaB5701(v) => profile.hla_b5701 = Some(v),
        }
    }
}

fn invalid(name: &str, value: &str, expected: &str) -> Error {
    Error::Validation(format!("patient field '{name}': '{value}' is not {expected}"))
}

fn text(value: &str) -> Option<String> {
    non_empty(Some(value)).map(str::to_string)
}

/// `"a, b,,c "` → `["a", "b", "c"]`
fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).collect()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" | "positive" | "+" => Some(true),
        "no" | "n" | "false" | "0" | "negative" | "-" => Some(false),
        _ => None,
    }
}

/// A batch of field assignments, validated as a whole before any is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientUpdate {
    fields: Vec<PatientField>,
}

impl PatientUpdate {
    pub fn parse<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| PatientField::parse(k.as_ref(), v.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Later assignments to the same field win.
    pub fn apply(self, profile: &mut PatientProfile) {
        for field in self.fields {
            field.apply(profile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_renders_marker() {
        assert_eq!(PatientProfile::default().render(), NO_PATIENT_HISTORY);
    }

    #[test]
    fn renders_fields_in_order() {
        let profile = PatientProfile {
            age: Some(45),
            gender: Some("female".into()),
            allergies: vec!["penicillin".into(), "sulfa".into()],
            smoker: Some(false),
            hla_b5701: Some(true),
            cyp2d6: Some("poor metabolizer".into()),
            ..PatientProfile::default()
        };
        assert_eq!(
            profile.render(),
            "**Age:** 45\n**Gender:** female\n**⚠️ ALLERGIES:** penicillin, sulfa\n**Smoker:** No\n\
             **Pharmacogenomics:** CYP2D6: poor metabolizer, HLA-B*57:01: Positive"
        );
    }

    #[test]
    fn list_values_are_split_and_trimmed() {
        let field = PatientField::parse("medications", " metformin, lisinopril ,, ").unwrap();
        assert_eq!(field, PatientField::Medications(vec!["metformin".into(), "lisinopril".into()]));
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(matches!(PatientField::parse("blood_type", "O+"), Err(Error::Validation(_))));
        assert!(matches!(PatientField::parse("age", "forty"), Err(Error::Validation(_))));
        assert!(matches!(PatientField::parse("weight", "-3"), Err(Error::Validation(_))));
        assert!(matches!(PatientField::parse("smoker", "sometimes"), Err(Error::Validation(_))));
    }

    #[test]
    fn update_is_all_or_nothing() {
        let err = PatientUpdate::parse([("age", "50"), ("height", "180")]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut profile = PatientProfile::default();
        PatientUpdate::parse([("age", "50"), ("weight", "72.5 kg"), ("hla_b5701", "negative")])
            .unwrap()
            .apply(&mut profile);
        assert_eq!(profile.age, Some(50));
        assert_eq!(profile.weight, Some(72.5));
        assert_eq!(profile.hla_b5701, Some(false));
    }
}
