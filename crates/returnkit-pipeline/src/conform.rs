//! Cell conformance (type coercion)
//!
//! Each column type has its own conversion. A blank input is always a legal
//! "no data" state and converts to `Value::Blank` without error; every other
//! input either converts or yields a `ConformError` describing why not.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

use returnkit_core::{CategoryCandidate, ColumnType, NumericKind, NumericSpec, StringKind, Value};

/// Why a cell could not be converted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConformError {
    #[error("'{value}' is not a date in format '{format}'")]
    Date { value: String, format: String },

    #[error("'{0}' is not a number")]
    NotNumeric(String),

    #[error("'{0}' is not a whole number")]
    NotInteger(String),

    #[error("{value} is outside the range {min}..={max}")]
    OutOfRange { value: String, min: String, max: String },

    #[error("'{0}' does not match any permitted code")]
    NoCategory(String),

    #[error("'{0}' is not a valid postcode")]
    Postcode(String),

    #[error("'{0}' does not match the required pattern")]
    Pattern(String),
}

fn postcode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[A-Z]{1,2}[0-9][A-Z0-9]? ?[0-9][A-Z]{2}$").expect("valid postcode pattern")
    })
}

/// Convert `value` to the representation `column_type` requires
pub fn conform(value: &Value, column_type: &ColumnType) -> Result<Value, ConformError> {
    if value.is_blank() {
        return Ok(Value::Blank);
    }

    match column_type {
        ColumnType::Date { format } => to_date(value, format),
        ColumnType::Numeric(spec) => to_number(value, spec),
        ColumnType::Category(candidates) => to_category(value, candidates),
        ColumnType::String { kind, patterns } => to_string(value, *kind, patterns),
    }
}

fn to_date(value: &Value, format: &str) -> Result<Value, ConformError> {
    if let Value::Date(date) = value {
        return Ok(Value::Date(*date));
    }

    let text = value.render();
    NaiveDate::parse_from_str(text.trim(), format)
        .map(Value::Date)
        .map_err(|_| ConformError::Date {
            value: text.trim().to_string(),
            format: format.to_string(),
        })
}

fn to_number(value: &Value, spec: &NumericSpec) -> Result<Value, ConformError> {
    let text = value.render();
    let number = value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| ConformError::NotNumeric(text.trim().to_string()))?;

    let below = spec.min.map_or(false, |min| number < min);
    let above = spec.max.map_or(false, |max| number > max);
    if below || above {
        return Err(ConformError::OutOfRange {
            value: text.trim().to_string(),
            min: spec.min.map_or_else(|| "-inf".to_string(), |m| m.to_string()),
            max: spec.max.map_or_else(|| "inf".to_string(), |m| m.to_string()),
        });
    }

    match spec.kind {
        NumericKind::Integer => value
            .as_i64()
            .or_else(|| (number.fract() == 0.0).then_some(number as i64))
            .map(Value::Integer)
            .ok_or_else(|| ConformError::NotInteger(text.trim().to_string())),
        NumericKind::Float => Ok(Value::Float(match spec.decimal_places {
            Some(places) => round_to(number, places),
            None => number,
        })),
    }
}

fn round_to(number: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places.min(15) as i32);
    (number * factor).round() / factor
}

/// Text used for category matching: trimmed, with whole floats written as integers
fn category_text(value: &Value) -> String {
    match value {
        Value::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        Value::Text(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<f64>() {
                Ok(f) if trimmed.contains('.') && f.is_finite() && f.fract() == 0.0 => (f as i64).to_string(),
                _ => trimmed.to_string(),
            }
        }
        other => other.render(),
    }
}

/// Boolean reading of a candidate's code or name
fn boolean_alias(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "t" => Some(true),
        "false" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

/// Boolean reading of a cell; `1`/`0` only count here, so numeric codes
/// such as `1` = Male never read as "yes"
fn cell_boolean(text: &str) -> Option<bool> {
    match text.trim() {
        "1" => Some(true),
        "0" => Some(false),
        other => boolean_alias(other),
    }
}

fn candidate_matches(candidate: &CategoryCandidate, text: &str) -> bool {
    if candidate.code.eq_ignore_ascii_case(text) {
        return true;
    }
    if candidate
        .name
        .as_deref()
        .map_or(false, |name| name.trim().eq_ignore_ascii_case(text))
    {
        return true;
    }
    if candidate.patterns.iter().any(|p| p.is_match(text)) {
        return true;
    }

    match cell_boolean(text) {
        Some(flag) => {
            boolean_alias(&candidate.code) == Some(flag)
                || candidate.name.as_deref().and_then(boolean_alias) == Some(flag)
        }
        None => false,
    }
}

fn to_category(value: &Value, candidates: &[CategoryCandidate]) -> Result<Value, ConformError> {
    let text = category_text(value);

    // An exact code beats any alias of an earlier candidate
    candidates
        .iter()
        .find(|candidate| candidate.code == text)
        .or_else(|| candidates.iter().find(|candidate| candidate_matches(candidate, &text)))
        .map(|candidate| Value::text(candidate.code.clone()))
        .ok_or(ConformError::NoCategory(text))
}

fn to_string(value: &Value, kind: StringKind, patterns: &[Regex]) -> Result<Value, ConformError> {
    let text = value.render();
    let trimmed = text.trim();

    match kind {
        StringKind::Alphanumeric => Ok(Value::text(trimmed)),
        StringKind::Postcode => {
            if postcode_pattern().is_match(trimmed) {
                Ok(Value::text(trimmed.to_ascii_uppercase()))
            } else {
                Err(ConformError::Postcode(trimmed.to_string()))
            }
        }
        StringKind::Regex => {
            if patterns.iter().any(|p| p.is_match(trimmed)) {
                Ok(Value::text(trimmed))
            } else {
                Err(ConformError::Pattern(trimmed.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use returnkit_core::full_match_regex;

    fn unit_interval() -> ColumnType {
        ColumnType::Numeric(
            NumericSpec::float()
                .with_range(Some(0.0), Some(1.0))
                .with_decimal_places(2),
        )
    }

    fn yes_no() -> ColumnType {
        ColumnType::Category(vec![
            CategoryCandidate::new("0").with_name("False"),
            CategoryCandidate::new("1").with_name("True"),
        ])
    }

    #[test]
    fn blank_never_errors() {
        let types = [
            ColumnType::date("%d/%m/%Y"),
            unit_interval(),
            ColumnType::Numeric(NumericSpec::integer()),
            yes_no(),
            ColumnType::String { kind: StringKind::Postcode, patterns: Vec::new() },
            ColumnType::String {
                kind: StringKind::Regex,
                patterns: vec![full_match_regex("[A-Z]\\d{12}", false).unwrap()],
            },
        ];

        for column_type in &types {
            assert_eq!(conform(&Value::Blank, column_type), Ok(Value::Blank));
            assert_eq!(conform(&Value::text("  "), column_type), Ok(Value::Blank));
        }
    }

    #[test]
    fn float_within_range() {
        assert_eq!(conform(&Value::text("0.2"), &unit_interval()), Ok(Value::Float(0.2)));
        assert_eq!(conform(&Value::text("0.456"), &unit_interval()), Ok(Value::Float(0.46)));
    }

    #[test]
    fn float_out_of_range() {
        assert!(matches!(
            conform(&Value::Integer(-1), &unit_interval()),
            Err(ConformError::OutOfRange { .. })
        ));
        assert!(matches!(
            conform(&Value::text("abc"), &unit_interval()),
            Err(ConformError::NotNumeric(_))
        ));
    }

    #[test]
    fn integers_must_be_whole() {
        let integer = ColumnType::Numeric(NumericSpec::integer().with_range(Some(0.0), None));
        assert_eq!(conform(&Value::text(" 42 "), &integer), Ok(Value::Integer(42)));
        assert_eq!(conform(&Value::text("3.0"), &integer), Ok(Value::Integer(3)));
        assert!(matches!(conform(&Value::text("3.5"), &integer), Err(ConformError::NotInteger(_))));
        assert!(matches!(conform(&Value::text("-2"), &integer), Err(ConformError::OutOfRange { .. })));
    }

    #[test]
    fn dates_use_configured_format() {
        let date = ColumnType::date("%d/%m/%Y");
        let expected = NaiveDate::from_ymd_opt(2022, 4, 1).unwrap();
        assert_eq!(conform(&Value::text("01/04/2022"), &date), Ok(Value::Date(expected)));
        assert_eq!(conform(&Value::Date(expected), &date), Ok(Value::Date(expected)));
        assert!(matches!(conform(&Value::text("2022-04-01"), &date), Err(ConformError::Date { .. })));
    }

    #[test]
    fn category_aliases() {
        assert_eq!(conform(&Value::text("true"), &yes_no()), Ok(Value::text("1")));
        assert_eq!(conform(&Value::text("YES"), &yes_no()), Ok(Value::text("1")));
        assert_eq!(conform(&Value::text("n"), &yes_no()), Ok(Value::text("0")));
        assert_eq!(conform(&Value::text("1.0"), &yes_no()), Ok(Value::text("1")));
        assert_eq!(conform(&Value::Float(0.0), &yes_no()), Ok(Value::text("0")));
        assert!(matches!(conform(&Value::text("maybe"), &yes_no()), Err(ConformError::NoCategory(_))));
    }

    #[test]
    fn numeric_cells_read_as_booleans() {
        let flag = ColumnType::Category(vec![
            CategoryCandidate::new("Y").with_name("Yes"),
            CategoryCandidate::new("N").with_name("No"),
        ]);
        assert_eq!(conform(&Value::text("1"), &flag), Ok(Value::text("Y")));
        assert_eq!(conform(&Value::Integer(0), &flag), Ok(Value::text("N")));
        assert_eq!(conform(&Value::text("yes"), &flag), Ok(Value::text("Y")));

        let reversed = ColumnType::Category(vec![
            CategoryCandidate::new("Y").with_name("Yes"),
            CategoryCandidate::new("1").with_name("One"),
        ]);
        assert_eq!(conform(&Value::text("1"), &reversed), Ok(Value::text("1")));

        let sex = ColumnType::Category(vec![
            CategoryCandidate::new("1").with_name("Male"),
            CategoryCandidate::new("2").with_name("Female"),
        ]);
        assert!(matches!(conform(&Value::text("yes"), &sex), Err(ConformError::NoCategory(_))));
        assert!(matches!(conform(&Value::text("0"), &sex), Err(ConformError::NoCategory(_))));
    }

    #[test]
    fn earlier_candidate_wins() {
        let overlapping = ColumnType::Category(vec![
            CategoryCandidate::new("A").with_patterns(vec![full_match_regex("a.*", true).unwrap()]),
            CategoryCandidate::new("B").with_patterns(vec![full_match_regex(".*b", true).unwrap()]),
        ]);
        assert_eq!(conform(&Value::text("ab"), &overlapping), Ok(Value::text("A")));
        assert_eq!(conform(&Value::text("cb"), &overlapping), Ok(Value::text("B")));
    }

    #[test]
    fn string_kinds() {
        let postcode = ColumnType::String { kind: StringKind::Postcode, patterns: Vec::new() };
        assert_eq!(conform(&Value::text(" sw1a 1aa "), &postcode), Ok(Value::text("SW1A 1AA")));
        assert!(matches!(conform(&Value::text("12345"), &postcode), Err(ConformError::Postcode(_))));

        let upn = ColumnType::String {
            kind: StringKind::Regex,
            patterns: vec![full_match_regex("[A-Z]\\d{12}", false).unwrap()],
        };
        assert_eq!(conform(&Value::text(" A123456789012"), &upn), Ok(Value::text("A123456789012")));
        assert!(matches!(conform(&Value::text("A1234"), &upn), Err(ConformError::Pattern(_))));

        assert_eq!(conform(&Value::text(" abc "), &ColumnType::alphanumeric()), Ok(Value::text("abc")));
    }
}
