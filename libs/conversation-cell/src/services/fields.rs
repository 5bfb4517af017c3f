use chrono::{NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::models::PatientField;

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9]{10,15}$").unwrap())
}

/// Validates one free-text reply against the field currently being
/// collected. `Ok` carries the normalized value to cache; `Err` carries the
/// field-specific re-prompt shown to the patient.
pub fn validate(field: PatientField, input: &str) -> Result<String, String> {
    let trimmed = input.trim();

    match field {
        PatientField::Name => {
            if trimmed.chars().count() < 2 || trimmed.chars().any(|c| c.is_ascii_digit()) {
                Err("That doesn't look like a name. Please send your full name.".to_string())
            } else {
                Ok(trimmed.to_string())
            }
        }
        PatientField::Phone => {
            let normalized: String = trimmed
                .chars()
                .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
                .collect();
            if phone_pattern().is_match(&normalized) {
                Ok(normalized)
            } else {
                Err("That phone number doesn't look valid. Please send digits only, e.g. +14155550123.".to_string())
            }
        }
        PatientField::DateOfBirth => {
            let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"));
            match parsed {
                Ok(date) if date < Utc::now().date_naive() => {
                    Ok(date.format("%Y-%m-%d").to_string())
                }
                Ok(_) => Err("That date is in the future. Please send your date of birth as YYYY-MM-DD.".to_string()),
                Err(_) => Err("I couldn't read that date. Please use YYYY-MM-DD.".to_string()),
            }
        }
        PatientField::Gender => {
            match trimmed.to_lowercase().as_str() {
                "m" | "male" | "man" => Ok("male".to_string()),
                "f" | "female" | "woman" => Ok("female".to_string()),
                "other" | "nonbinary" | "non-binary" | "nb" | "skip" | "prefer not to say" => {
                    Ok("other".to_string())
                }
                _ => Err("Please answer male, female, other, or 'skip'.".to_string()),
            }
        }
        PatientField::Reason => {
            if trimmed.is_empty() {
                Err("Please tell us briefly why you'd like to see the doctor.".to_string())
            } else {
                Ok(trimmed.to_string())
            }
        }
    }
}
