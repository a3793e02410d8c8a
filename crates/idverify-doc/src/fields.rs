//! Date-of-birth and holder-name extraction from recognized text.
//!
//! Names are picked by line classification, not by field labels: the first
//! usable line in Devanagari and the first usable line in any other script.
//! Layouts that put the name on the same line as a label defeat it.

use crate::recognizer::RecognizedLine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Issuing-authority phrases, gender labels and slogans that are never names.
pub const BOILERPLATE_PHRASES: &[&str] = &[
    "government of india",
    "govt of india",
    "भारत सरकार",
    "indian government",
    "republic of india",
    "ministry of",
    "aadhaar",
    "uidai",
    "male",
    "female",
    "महिला",
    "पुरुष",
    "aam aadmi ka aadhikar",
    "मेरा आधार मेरी पहचान",
];

static DOB_RE: OnceLock<Regex> = OnceLock::new();
static DIGIT_LEADING_RE: OnceLock<Regex> = OnceLock::new();

fn dob_re() -> &'static Regex {
    DOB_RE.get_or_init(|| Regex::new(r"\d{2}/\d{2}/\d{4}").expect("static regex"))
}

fn digit_leading_re() -> &'static Regex {
    DIGIT_LEADING_RE.get_or_init(|| Regex::new(r"^\d").expect("static regex"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityResult {
    pub date_of_birth: Option<String>,
    /// Name in the local (Devanagari) script.
    pub name_local: Option<String>,
    /// Name in Latin or any other script.
    pub name_alt: Option<String>,
}

/// How a recognized line is treated during name search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Blank,
    DigitLeading,
    Boilerplate,
    LocalScript,
    AlternateScript,
}

/// Classification rules in priority order; the first predicate that holds decides.
/// Lines matching none are `AlternateScript`.
const RULES: &[(LineClass, fn(&str) -> bool)] = &[
    (LineClass::Blank, is_blank),
    (LineClass::DigitLeading, is_digit_leading),
    (LineClass::Boilerplate, is_boilerplate),
    (LineClass::LocalScript, has_devanagari),
];

fn is_blank(line: &str) -> bool {
    line.is_empty()
}

fn is_digit_leading(line: &str) -> bool {
    digit_leading_re().is_match(line)
}

fn is_boilerplate(line: &str) -> bool {
    let lower = line.to_lowercase();
    BOILERPLATE_PHRASES.iter().any(|p| lower.contains(p))
}

fn has_devanagari(line: &str) -> bool {
    line.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c))
}

/// Classify an already trimmed line.
pub fn classify(line: &str) -> LineClass {
    RULES
        .iter()
        .find(|(_, applies)| applies(line))
        .map(|(class, _)| *class)
        .unwrap_or(LineClass::AlternateScript)
}

/// First `DD/MM/YYYY` substring of the text, if any.
pub fn find_date_of_birth(lines: &[RecognizedLine]) -> Option<String> {
    let text = lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n");
    dob_re().find(&text).map(|m| m.as_str().to_string())
}

/// Parse recognized lines into date of birth and names. Never fails.
pub fn extract_identity(lines: &[RecognizedLine]) -> IdentityResult {
    let mut result = IdentityResult {
        date_of_birth: find_date_of_birth(lines),
        ..IdentityResult::default()
    };

    for line in lines {
        let text = line.text.trim();
        let slot = match classify(text) {
            LineClass::LocalScript => &mut result.name_local,
            LineClass::AlternateScript => &mut result.name_alt,
            LineClass::Blank | LineClass::DigitLeading | LineClass::Boilerplate => continue,
        };
        if slot.is_none() {
            *slot = Some(text.to_string());
        }
        if result.name_local.is_some() && result.name_alt.is_some() {
            break;
        }
    }

    tracing::debug!(
        dob = result.date_of_birth.is_some(),
        name_local = result.name_local.is_some(),
        name_alt = result.name_alt.is_some(),
        "identity fields extracted"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<RecognizedLine> {
        texts.iter().map(|t| RecognizedLine::new(*t)).collect()
    }

    #[test]
    fn skips_boilerplate_and_digit_lines() {
        let r = extract_identity(&lines(&["GOVERNMENT OF INDIA", "MALE", "1990", "Rahul Sharma"]));
        assert_eq!(r.name_alt.as_deref(), Some("Rahul Sharma"));
        assert_eq!(r.name_local, None);
    }

    #[test]
    fn extracts_first_date() {
        let r = extract_identity(&lines(&["DOB: 15/08/1990 Issued 2020"]));
        assert_eq!(r.date_of_birth.as_deref(), Some("15/08/1990"));
    }

    #[test]
    fn date_spanning_lines_is_not_joined() {
        let r = extract_identity(&lines(&["15/08", "/1990"]));
        assert_eq!(r.date_of_birth, None);
    }

    #[test]
    fn first_of_several_dates_wins() {
        let r = extract_identity(&lines(&["Issue 01/02/2020", "DOB 03/04/1985"]));
        assert_eq!(r.date_of_birth.as_deref(), Some("01/02/2020"));
    }

    #[test]
    fn one_name_per_script_bucket() {
        let r = extract_identity(&lines(&[
            "भारत सरकार",
            "राहुल शर्मा",
            "Rahul Sharma",
            "सुनील",
            "Sunil",
        ]));
        assert_eq!(r.name_local.as_deref(), Some("राहुल शर्मा"));
        assert_eq!(r.name_alt.as_deref(), Some("Rahul Sharma"));
    }

    #[test]
    fn lines_are_trimmed() {
        let r = extract_identity(&lines(&["   Priya Verma  "]));
        assert_eq!(r.name_alt.as_deref(), Some("Priya Verma"));
    }

    #[test]
    fn blank_lines_do_not_fill_buckets() {
        let r = extract_identity(&lines(&["", "  ", "Anita Rao"]));
        assert_eq!(r.name_alt.as_deref(), Some("Anita Rao"));
    }

    #[test]
    fn female_is_boilerplate() {
        assert_eq!(classify("Female"), LineClass::Boilerplate);
        assert_eq!(classify("महिला / FEMALE"), LineClass::Boilerplate);
    }

    #[test]
    fn rule_priority() {
        assert_eq!(classify(""), LineClass::Blank);
        assert_eq!(classify("1234 5678 9012"), LineClass::DigitLeading);
        // digit-leading wins over boilerplate
        assert_eq!(classify("2 Ministry of Home"), LineClass::DigitLeading);
        assert_eq!(classify("Aadhaar"), LineClass::Boilerplate);
        assert_eq!(classify("राहुल"), LineClass::LocalScript);
        assert_eq!(classify("Rahul"), LineClass::AlternateScript);
    }

    #[test]
    fn mixed_script_line_is_local() {
        assert_eq!(classify("Name / नाम"), LineClass::LocalScript);
    }

    #[test]
    fn no_text_gives_empty_result() {
        assert_eq!(extract_identity(&[]), IdentityResult::default());
    }
}
