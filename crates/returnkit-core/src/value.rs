//! Cell values
//!
//! A single value type is used for raw (as parsed) and conformed (typed)
//! cells, so that filters can pass values along without re-wrapping them.

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::fmt;

use crate::schema::{ColumnType, NumericKind};

/// Date rendering used for every stored (snapshot/export) file
pub const STORED_DATE_FORMAT: &str = "%Y-%m-%d";

/// A cell value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No data
    #[default]
    Blank,

    /// Whole number
    Integer(i64),

    /// Floating point number
    Float(f64),

    /// Calendar date
    Date(NaiveDate),

    /// Text (raw cells are always text until conformed)
    Text(String),
}

impl Value {
    /// Create a text value
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// True for `Blank` and for text that is empty after trimming
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Blank => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Borrow the text of a `Text` value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the date of a `Date` value
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Interpret the value as a whole number, if it is one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a float, if it is numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Blank-normalised copy: whitespace-only text becomes `Blank`
    pub fn normalised(self) -> Self {
        if self.is_blank() {
            Self::Blank
        } else {
            self
        }
    }

    /// Rendering used in stored files
    pub fn render(&self) -> String {
        match self {
            Self::Blank => String::new(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Date(d) => d.format(STORED_DATE_FORMAT).to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Re-type a stored cell using the column type it was written for
    ///
    /// Anything that does not parse as the expected type is kept as text.
    pub fn from_stored(raw: &str, column_type: Option<&ColumnType>) -> Self {
        if raw.trim().is_empty() {
            return Self::Blank;
        }

        match column_type {
            Some(ColumnType::Date { .. }) => NaiveDate::parse_from_str(raw.trim(), STORED_DATE_FORMAT)
                .map(Self::Date)
                .unwrap_or_else(|_| Self::text(raw)),
            Some(ColumnType::Numeric(spec)) => {
                let trimmed = raw.trim();
                if spec.kind == NumericKind::Integer {
                    if let Ok(i) = trimmed.parse::<i64>() {
                        return Self::Integer(i);
                    }
                }
                trimmed
                    .parse::<f64>()
                    .map(Self::Float)
                    .unwrap_or_else(|_| Self::text(raw))
            }
            _ => Self::text(raw),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Integer(_) | Self::Float(_) => 0,
            Self::Date(_) => 1,
            Self::Text(_) => 2,
            Self::Blank => 3,
        }
    }

    /// Ordering used by sort keys
    ///
    /// Blanks always sort last, whichever direction is requested.
    pub fn sort_cmp(&self, other: &Self, ascending: bool) -> Ordering {
        match (self.is_blank(), other.is_blank()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        let ordering = match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (a, b) if a.rank() == 0 && b.rank() == 0 => {
                let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        };

        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Blank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NumericSpec;

    #[test]
    fn blank_detection() {
        assert!(Value::Blank.is_blank());
        assert!(Value::text("   ").is_blank());
        assert!(!Value::text("x").is_blank());
        assert!(!Value::Integer(0).is_blank());
    }

    #[test]
    fn stored_rendering_round_trips() {
        let date = NaiveDate::from_ymd_opt(2022, 3, 31).unwrap();
        let date_type = ColumnType::Date { format: "%d/%m/%Y".to_string() };
        assert_eq!(Value::Date(date).render(), "2022-03-31");
        assert_eq!(Value::from_stored("2022-03-31", Some(&date_type)), Value::Date(date));

        let float_type = ColumnType::Numeric(NumericSpec::float());
        assert_eq!(Value::from_stored(&Value::Float(0.2).render(), Some(&float_type)), Value::Float(0.2));

        let int_type = ColumnType::Numeric(NumericSpec::integer());
        assert_eq!(Value::from_stored("42", Some(&int_type)), Value::Integer(42));
        assert_eq!(Value::from_stored("", Some(&int_type)), Value::Blank);
    }

    #[test]
    fn blanks_sort_last_in_both_directions() {
        let blank = Value::Blank;
        let one = Value::Integer(1);
        assert_eq!(blank.sort_cmp(&one, true), Ordering::Greater);
        assert_eq!(blank.sort_cmp(&one, false), Ordering::Greater);
        assert_eq!(one.sort_cmp(&Value::Float(2.5), true), Ordering::Less);
        assert_eq!(one.sort_cmp(&Value::Float(2.5), false), Ordering::Greater);
    }
}
