//! Repair rules for open and overlapping episodes
//!
//! Stage 1 closes episodes left open in a return that is not the latest one
//! for their authority. The first matching row of the decision table wins,
//! so the order of `Stage1Rule::select` is significant. Stage 2 then looks at
//! the (possibly updated) end date against the next episode reported in the
//! following year.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::episode::EpisodeRecord;

/// Derived predicates of one linked episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeFlags {
    pub has_open_episode_error: bool,
    pub has_next_episode: bool,
    pub has_previous_episode: bool,
    pub has_next_episode_with_rne_s: bool,
    pub next_episode_is_duplicate: bool,
    pub previous_episode_is_duplicate: bool,
    pub previous_episode_submitted_later: bool,
}

impl EpisodeFlags {
    /// Evaluate the flags of `record` given its authority's latest year
    pub fn evaluate(record: &EpisodeRecord, latest_year: Option<i64>) -> Self {
        let open = record.dec.is_none();
        let has_next_episode = record.next.decom.is_some();
        let has_previous_episode = record.previous.decom.is_some();

        let previous_episode_submitted_later = match (record.previous.year, record.year) {
            (Some(previous), Some(year)) => has_previous_episode && open && previous > year,
            _ => false,
        };

        Self {
            has_open_episode_error: open && record.year != latest_year,
            has_next_episode,
            has_previous_episode,
            has_next_episode_with_rne_s: has_next_episode && record.next.rne.as_deref() == Some("S"),
            next_episode_is_duplicate: has_next_episode && open && record.same_placement(&record.next),
            previous_episode_is_duplicate: has_previous_episode && open && record.same_placement(&record.previous),
            previous_episode_submitted_later,
        }
    }
}

/// Rules closing an open episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage1Rule {
    /// Duplicate of an adjacent episode
    #[serde(rename = "RULE_3")]
    Rule3,

    /// A previous episode was submitted in a later return
    #[serde(rename = "RULE_3A")]
    Rule3A,

    /// Next episode starts with RNE = S
    #[serde(rename = "RULE_1A")]
    Rule1A,

    /// Next episode exists
    #[serde(rename = "RULE_1")]
    Rule1,

    /// No next episode
    #[serde(rename = "RULE_2")]
    Rule2,
}

impl Stage1Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rule3 => "RULE_3",
            Self::Rule3A => "RULE_3A",
            Self::Rule1A => "RULE_1A",
            Self::Rule1 => "RULE_1",
            Self::Rule2 => "RULE_2",
        }
    }

    /// First matching row of the stage 1 decision table
    pub fn select(flags: &EpisodeFlags) -> Option<Self> {
        if !flags.has_open_episode_error {
            return None;
        }

        let rule = if flags.next_episode_is_duplicate || flags.previous_episode_is_duplicate {
            Self::Rule3
        } else if flags.previous_episode_submitted_later {
            Self::Rule3A
        } else if flags.has_next_episode && flags.has_next_episode_with_rne_s {
            Self::Rule1A
        } else if flags.has_next_episode {
            Self::Rule1
        } else {
            Self::Rule2
        };
        Some(rule)
    }

    /// Apply the rule's effects to `record`; false when no closing date can
    /// be derived, in which case the record is left untouched
    ///
    /// `RULE_3` and `RULE_3A` only tag the episode.
    pub fn apply(&self, record: &mut EpisodeRecord) -> bool {
        match self {
            Self::Rule1 => {
                record.dec = record.next.decom;
                record.rec = Some("X1".to_string());
                if record.reason_place_change.as_deref() == Some("CAREPL") {
                    record.reason_place_change = Some("LIIAF".to_string());
                }
            }
            Self::Rule1A => {
                let start_of_month = record.next.decom.and_then(|d| d.with_day(1));
                let year_end = record.year.and_then(fiscal_year_end);
                let dec = match (start_of_month, year_end) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                if dec.is_none() {
                    return false;
                }
                record.dec = dec;
                record.rec = Some("E99".to_string());
            }
            Self::Rule2 => {
                let Some(year_end) = record.year.and_then(fiscal_year_end) else {
                    return false;
                };
                record.dec = Some(year_end);
                record.rec = Some("E99".to_string());
            }
            Self::Rule3 | Self::Rule3A => {}
        }
        record.source = self.name().to_string();
        true
    }
}

impl fmt::Display for Stage1Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Rules aligning an episode with the next year's return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage2Rule {
    /// Next episode starts on or before this one ends
    #[serde(rename = "RULE_4")]
    Rule4,

    /// Gap after an X1 closure
    #[serde(rename = "RULE_5")]
    Rule5,
}

impl Stage2Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rule4 => "RULE_4",
            Self::Rule5 => "RULE_5",
        }
    }

    /// Stage 2 rule for `record`, evaluated on its current end date
    pub fn select(record: &EpisodeRecord) -> Option<Self> {
        let (Some(next_decom), Some(dec)) = (record.next.decom, record.dec) else {
            return None;
        };
        let next_year_return = match (record.next.year, record.year) {
            (Some(next), Some(year)) => next == year + 1,
            _ => false,
        };
        if !next_year_return {
            return None;
        }

        if next_decom <= dec {
            Some(Self::Rule4)
        } else if record.rec.as_deref() == Some("X1") {
            Some(Self::Rule5)
        } else {
            None
        }
    }

    /// End the episode where the next one starts and record the rule
    pub fn apply(&self, record: &mut EpisodeRecord) {
        record.dec = record.next.decom;
        record.source = if record.source == crate::episode::ORIGINAL {
            self.name().to_string()
        } else {
            format!("{} | {}", record.source, self.name())
        };
    }
}

impl fmt::Display for Stage2Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 31 March of `year`
pub fn fiscal_year_end(year: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, 3, 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{Neighbour, ORIGINAL};
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn open_episode(year: i64) -> EpisodeRecord {
        EpisodeRecord {
            index: 0,
            la: None,
            child: Some("1001".to_string()),
            decom: Some(date(2021, 5, 1)),
            dec: None,
            rne: Some("P".to_string()),
            ls: Some("C2".to_string()),
            place: Some("U1".to_string()),
            place_provider: Some("PR1".to_string()),
            pl_post: None,
            urn: None,
            year: Some(year),
            rec: None,
            reason_place_change: None,
            previous: Neighbour::default(),
            next: Neighbour::default(),
            source: ORIGINAL.to_string(),
        }
    }

    fn next_episode(decom: NaiveDate, rne: &str, year: i64) -> Neighbour {
        Neighbour {
            decom: Some(decom),
            rne: Some(rne.to_string()),
            ls: Some("C2".to_string()),
            place: Some("U3".to_string()),
            place_provider: Some("PR1".to_string()),
            pl_post: None,
            urn: None,
            year: Some(year),
        }
    }

    // =========================================================================
    // Flags and stage 1 selection
    // =========================================================================

    #[test]
    fn latest_year_is_not_an_error() {
        let record = open_episode(2022);
        let flags = EpisodeFlags::evaluate(&record, Some(2022));
        assert!(!flags.has_open_episode_error);
        assert_eq!(Stage1Rule::select(&flags), None);
    }

    #[test]
    fn duplicate_dominates_other_rules() {
        let flags = EpisodeFlags {
            has_open_episode_error: true,
            has_next_episode: true,
            has_previous_episode: true,
            has_next_episode_with_rne_s: true,
            next_episode_is_duplicate: true,
            previous_episode_is_duplicate: false,
            previous_episode_submitted_later: true,
        };
        assert_eq!(Stage1Rule::select(&flags), Some(Stage1Rule::Rule3));
    }

    #[test]
    fn decision_table_order() {
        let open = EpisodeFlags { has_open_episode_error: true, ..Default::default() };
        assert_eq!(Stage1Rule::select(&open), Some(Stage1Rule::Rule2));

        let next = EpisodeFlags { has_next_episode: true, ..open };
        assert_eq!(Stage1Rule::select(&next), Some(Stage1Rule::Rule1));

        let next_s = EpisodeFlags { has_next_episode_with_rne_s: true, ..next };
        assert_eq!(Stage1Rule::select(&next_s), Some(Stage1Rule::Rule1A));

        let later = EpisodeFlags { previous_episode_submitted_later: true, ..next_s };
        assert_eq!(Stage1Rule::select(&later), Some(Stage1Rule::Rule3A));

        let duplicate = EpisodeFlags { previous_episode_is_duplicate: true, ..later };
        assert_eq!(Stage1Rule::select(&duplicate), Some(Stage1Rule::Rule3));
    }

    #[test]
    fn duplicates_compare_blanks_as_equal() {
        let mut record = open_episode(2021);
        record.next = Neighbour {
            place: Some("U1".to_string()),
            ..next_episode(date(2021, 9, 1), "P", 2021)
        };

        let flags = EpisodeFlags::evaluate(&record, Some(2022));
        assert!(flags.next_episode_is_duplicate);
        assert!(!flags.previous_episode_is_duplicate);

        record.dec = Some(date(2021, 9, 1));
        assert!(!EpisodeFlags::evaluate(&record, Some(2022)).next_episode_is_duplicate);
    }

    #[test]
    fn previous_submitted_later() {
        let mut record = open_episode(2021);
        record.previous = next_episode(date(2020, 1, 1), "L", 2022);

        let flags = EpisodeFlags::evaluate(&record, Some(2022));
        assert!(flags.previous_episode_submitted_later);
        assert_eq!(Stage1Rule::select(&flags), Some(Stage1Rule::Rule3A));
    }

    // =========================================================================
    // Stage 1 effects
    // =========================================================================

    #[test]
    fn rule_2_closes_at_year_end() {
        let mut record = open_episode(2022);
        Stage1Rule::Rule2.apply(&mut record);

        assert_eq!(record.dec, Some(date(2022, 3, 31)));
        assert_eq!(record.rec.as_deref(), Some("E99"));
        assert_eq!(record.source, "RULE_2");
    }

    #[test]
    fn rule_2_without_year_leaves_episode_open() {
        let mut record = open_episode(2022);
        record.year = None;

        assert!(!Stage1Rule::Rule2.apply(&mut record));
        assert_eq!(record.dec, None);
        assert_eq!(record.rec, None);
        assert_eq!(record.source, ORIGINAL);
    }

    #[test]
    fn rule_1_closes_at_next_start() {
        let mut record = open_episode(2021);
        record.reason_place_change = Some("CAREPL".to_string());
        record.next = next_episode(date(2021, 9, 14), "P", 2021);

        Stage1Rule::Rule1.apply(&mut record);
        assert_eq!(record.dec, Some(date(2021, 9, 14)));
        assert_eq!(record.rec.as_deref(), Some("X1"));
        assert_eq!(record.reason_place_change.as_deref(), Some("LIIAF"));
    }

    #[test]
    fn rule_1a_takes_earlier_of_month_start_and_year_end() {
        let mut record = open_episode(2021);
        record.next = next_episode(date(2021, 9, 14), "S", 2022);
        Stage1Rule::Rule1A.apply(&mut record);
        assert_eq!(record.dec, Some(date(2021, 3, 31)));
        assert_eq!(record.rec.as_deref(), Some("E99"));

        let mut record = open_episode(2022);
        record.next = next_episode(date(2021, 9, 14), "S", 2022);
        Stage1Rule::Rule1A.apply(&mut record);
        assert_eq!(record.dec, Some(date(2021, 9, 1)));
    }

    #[test]
    fn rule_3_only_tags() {
        let mut record = open_episode(2021);
        Stage1Rule::Rule3.apply(&mut record);
        assert_eq!(record.dec, None);
        assert_eq!(record.rec, None);
        assert_eq!(record.source, "RULE_3");
    }

    // =========================================================================
    // Stage 2
    // =========================================================================

    #[test]
    fn overlap_with_next_year() {
        let mut record = open_episode(2021);
        record.dec = Some(date(2021, 10, 1));
        record.next = next_episode(date(2021, 9, 1), "P", 2022);

        let rule = Stage2Rule::select(&record);
        assert_eq!(rule, Some(Stage2Rule::Rule4));
        rule.unwrap().apply(&mut record);
        assert_eq!(record.dec, Some(date(2021, 9, 1)));
        assert_eq!(record.source, "RULE_4");
    }

    #[test]
    fn x1_gap_appends_to_stage_1_source() {
        let mut record = open_episode(2021);
        record.dec = Some(date(2021, 8, 1));
        record.rec = Some("X1".to_string());
        record.source = "RULE_1".to_string();
        record.next = next_episode(date(2021, 9, 1), "P", 2022);

        assert_eq!(Stage2Rule::select(&record), Some(Stage2Rule::Rule5));
        Stage2Rule::Rule5.apply(&mut record);
        assert_eq!(record.dec, Some(date(2021, 9, 1)));
        assert_eq!(record.source, "RULE_1 | RULE_5");
    }

    #[test]
    fn same_year_next_episode_is_left_alone() {
        let mut record = open_episode(2021);
        record.dec = Some(date(2021, 10, 1));
        record.next = next_episode(date(2021, 9, 1), "P", 2021);
        assert_eq!(Stage2Rule::select(&record), None);

        record.next.year = Some(2022);
        record.dec = None;
        assert_eq!(Stage2Rule::select(&record), None);
    }

    #[test]
    fn rule_names_serialise() {
        assert_eq!(serde_json::to_string(&Stage1Rule::Rule3A).unwrap(), "\"RULE_3A\"");
        assert_eq!(Stage2Rule::Rule5.to_string(), "RULE_5");
        assert_eq!(fiscal_year_end(2023), Some(date(2023, 3, 31)));
    }
}
