//! Taxi clearance readback validation.
//!
//! An ASCII-uppercase containment check: the readback must mention the
//! cleared runway and every taxiway in the clearance, in either raw
//! ("16R", "A") or spoken ("one six right", "alpha") form.

use super::phraseology::{runway_phrase, spell_ident};

/// Result of validating a pilot readback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadbackResult {
    /// Whether every required item was present.
    pub valid: bool,
    /// Items that were missing from the readback.
    pub missing: Vec<String>,
}

/// Validate a readback against the cleared runway and taxiways.
pub fn validate_readback(readback: &str, runway: &str, taxiways: &[String]) -> ReadbackResult {
    let normalized = normalize(readback);
    let mut missing = Vec::new();

    if !contains_any(&normalized, &[runway.to_string(), runway_phrase(runway)]) {
        missing.push(runway.to_string());
    }

    for taxiway in taxiways {
        if !contains_any(&normalized, &[taxiway.clone(), spell_ident(taxiway)]) {
            missing.push(taxiway.clone());
        }
    }

    ReadbackResult {
        valid: missing.is_empty(),
        missing,
    }
}

fn normalize(text: &str) -> String {
    let upper: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                ' '
            }
        })
        .collect();
    // Collapse runs of spaces so multi-word forms match predictably
    upper.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_any(haystack: &str, forms: &[String]) -> bool {
    let padded = format!(" {} ", haystack);
    forms.iter().filter(|f| !f.is_empty()).any(|form| {
        let needle = format!(" {} ", normalize(form));
        padded.contains(&needle)
    })
}
