//! Reporting periods
//!
//! Periods are rendered fixed-width (`2023`, `2023-04`, `2023-t1`,
//! `2023-t1-primary`, `2023-04-m1`) so that lexical order of the rendering is
//! chronological order. `Ord` compares renderings.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ArchiveError;

/// School term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    Autumn,
    Spring,
    Summer,
}

impl Term {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Autumn => "t1",
            Self::Spring => "t2",
            Self::Summer => "t3",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "t1" | "autumn" => Some(Self::Autumn),
            "t2" | "spring" => Some(Self::Spring),
            "t3" | "summer" => Some(Self::Summer),
            _ => None,
        }
    }
}

/// The period a snapshot covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Period {
    /// Annual return
    Year(u16),

    /// Monthly return
    Month { year: u16, month: u8 },

    /// Termly return, optionally per school type
    Term {
        year: u16,
        term: Term,
        school_type: Option<String>,
    },

    /// Monthly return with a submission identifier
    Submission { year: u16, month: u8, submission: String },
}

impl Period {
    pub fn year(&self) -> u16 {
        match self {
            Self::Year(year)
            | Self::Month { year, .. }
            | Self::Term { year, .. }
            | Self::Submission { year, .. } => *year,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{:04}", year),
            Self::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Self::Term { year, term, school_type: None } => write!(f, "{:04}-{}", year, term.code()),
            Self::Term { year, term, school_type: Some(school) } => {
                write!(f, "{:04}-{}-{}", year, term.code(), school)
            }
            Self::Submission { year, month, submission } => write!(f, "{:04}-{:02}-{}", year, month, submission),
        }
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Labels end up in directory names
fn valid_label(label: &str) -> bool {
    !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromStr for Period {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ArchiveError::InvalidPeriod(s.to_string(), reason.to_string());

        let parts: Vec<&str> = s.trim().splitn(3, '-').collect();
        let year_part = parts.first().copied().unwrap_or_default();
        if year_part.len() != 4 {
            return Err(invalid("year must have four digits"));
        }
        let year: u16 = year_part.parse().map_err(|_| invalid("year is not a number"))?;

        let Some(second) = parts.get(1) else {
            return Ok(Self::Year(year));
        };

        if let Some(term) = Term::from_code(second) {
            return match parts.get(2) {
                None => Ok(Self::Term { year, term, school_type: None }),
                Some(school) if valid_label(school) => Ok(Self::Term {
                    year,
                    term,
                    school_type: Some(school.to_string()),
                }),
                Some(_) => Err(invalid("school type may only contain letters, digits and '_'")),
            };
        }

        let month: u8 = second.parse().map_err(|_| invalid("expected a month or a term"))?;
        if !(1..=12).contains(&month) {
            return Err(invalid("month must be between 1 and 12"));
        }

        match parts.get(2) {
            None => Ok(Self::Month { year, month }),
            Some(submission) if valid_label(submission) => Ok(Self::Submission {
                year,
                month,
                submission: submission.to_string(),
            }),
            Some(_) => Err(invalid("submission may only contain letters, digits and '_'")),
        }
    }
}
