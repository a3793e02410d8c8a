use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const ADULT_AGE: u32 = 18;
const DOB_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeResult {
    /// Whole years; `None` when no usable date of birth was given.
    pub age: Option<u32>,
    pub is_adult: bool,
}

/// Parse a strict `DD/MM/YYYY` date. Impossible dates (31/02) are rejected.
pub fn parse_dob(dob: &str) -> Option<NaiveDate> {
    let dob = dob.trim();
    if dob.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(dob, DOB_FORMAT).ok()
}

/// Whole years between `dob` and `today`; 0 for dates in the future.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

pub fn evaluate(dob: Option<&str>, today: NaiveDate) -> AgeResult {
    match dob.and_then(parse_dob) {
        Some(date) => {
            let age = age_on(date, today);
            AgeResult {
                age: Some(age),
                is_adult: age >= ADULT_AGE,
            }
        }
        None => {
            if let Some(raw) = dob {
                tracing::warn!(dob = raw, "unparseable date of birth");
            }
            AgeResult::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn exactly_eighteen_is_adult() {
        let r = evaluate(Some("19/10/2008"), date(2026, 10, 19));
        assert_eq!(r, AgeResult { age: Some(18), is_adult: true });
    }

    #[test]
    fn one_day_short_is_minor() {
        let r = evaluate(Some("20/10/2008"), date(2026, 10, 19));
        assert_eq!(r, AgeResult { age: Some(17), is_adult: false });
    }

    #[test]
    fn birthday_later_in_year() {
        assert_eq!(age_on(date(1990, 8, 15), date(2024, 3, 1)), 33);
        assert_eq!(age_on(date(1990, 8, 15), date(2024, 8, 15)), 34);
    }

    #[test]
    fn leap_day_birthday() {
        assert_eq!(age_on(date(2004, 2, 29), date(2022, 2, 28)), 17);
        assert_eq!(age_on(date(2004, 2, 29), date(2022, 3, 1)), 18);
    }

    #[test]
    fn missing_dob() {
        assert_eq!(evaluate(None, date(2026, 1, 1)), AgeResult { age: None, is_adult: false });
    }

    #[test]
    fn unparseable_dob() {
        let today = date(2026, 1, 1);
        assert_eq!(evaluate(Some("31/02/1990"), today).age, None);
        assert_eq!(evaluate(Some("1/2/1990"), today).age, None);
        assert_eq!(evaluate(Some("garbage"), today).age, None);
    }

    #[test]
    fn future_dob_is_zero() {
        let r = evaluate(Some("01/01/2030"), date(2026, 1, 1));
        assert_eq!(r, AgeResult { age: Some(0), is_adult: false });
    }
}
