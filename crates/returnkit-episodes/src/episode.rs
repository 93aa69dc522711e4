//! Episode records and neighbour windowing
//!
//! Episodes are grouped by (authority, child) and ordered by start date,
//! with undated episodes last. Each episode then carries a copy of the
//! comparison fields of the episode before and after it in its group; the
//! first and last episodes of a group get empty neighbours.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use returnkit_core::{Record, Value, STORED_DATE_FORMAT};

pub const LA: &str = "LA";
pub const CHILD: &str = "CHILD";
pub const DECOM: &str = "DECOM";
pub const DEC: &str = "DEC";
pub const RNE: &str = "RNE";
pub const LS: &str = "LS";
pub const PLACE: &str = "PLACE";
pub const PLACE_PROVIDER: &str = "PLACE_PROVIDER";
pub const PL_POST: &str = "PL_POST";
pub const URN: &str = "URN";
pub const YEAR: &str = "YEAR";
pub const REC: &str = "REC";
pub const REASON_PLACE_CHANGE: &str = "REASON_PLACE_CHANGE";
pub const EPISODE_SOURCE: &str = "Episode_source";

/// Source tag of an episode no rule has touched
pub const ORIGINAL: &str = "Original";

/// Fields of an adjacent episode that rules compare against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbour {
    pub decom: Option<NaiveDate>,
    pub rne: Option<String>,
    pub ls: Option<String>,
    pub place: Option<String>,
    pub place_provider: Option<String>,
    pub pl_post: Option<String>,
    pub urn: Option<String>,
    pub year: Option<i64>,
}

/// One episode of care, with its neighbours once linked
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    /// Position of the episode in the input table
    pub index: usize,

    pub la: Option<String>,
    pub child: Option<String>,
    pub decom: Option<NaiveDate>,
    pub dec: Option<NaiveDate>,
    pub rne: Option<String>,
    pub ls: Option<String>,
    pub place: Option<String>,
    pub place_provider: Option<String>,
    pub pl_post: Option<String>,
    pub urn: Option<String>,
    pub year: Option<i64>,
    pub rec: Option<String>,
    pub reason_place_change: Option<String>,

    pub previous: Neighbour,
    pub next: Neighbour,

    /// Rules applied so far, `" | "`-separated, or `Original`
    pub source: String,
}

/// Date of a cell: a typed date, or text in the stored or return format
pub fn date_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(date) => Some(*date),
        Value::Text(text) => {
            let text = text.trim();
            NaiveDate::parse_from_str(text, STORED_DATE_FORMAT)
                .or_else(|_| NaiveDate::parse_from_str(text, "%d/%m/%Y"))
                .ok()
        }
        _ => None,
    }
}

fn text_value(value: Option<&Value>) -> Option<String> {
    value
        .filter(|v| !v.is_blank())
        .map(|v| v.render().trim().to_string())
}

impl EpisodeRecord {
    pub fn from_row(index: usize, row: &Record) -> Self {
        let text = |column: &str| text_value(row.get(column));
        let date = |column: &str| row.get(column).and_then(date_value);

        Self {
            index,
            la: text(LA),
            child: text(CHILD),
            decom: date(DECOM),
            dec: date(DEC),
            rne: text(RNE),
            ls: text(LS),
            place: text(PLACE),
            place_provider: text(PLACE_PROVIDER),
            pl_post: text(PL_POST),
            urn: text(URN),
            year: row.get(YEAR).and_then(Value::as_i64),
            rec: text(REC),
            reason_place_change: text(REASON_PLACE_CHANGE),
            previous: Neighbour::default(),
            next: Neighbour::default(),
            source: ORIGINAL.to_string(),
        }
    }

    /// The fields a neighbouring episode sees
    pub fn as_neighbour(&self) -> Neighbour {
        Neighbour {
            decom: self.decom,
            rne: self.rne.clone(),
            ls: self.ls.clone(),
            place: self.place.clone(),
            place_provider: self.place_provider.clone(),
            pl_post: self.pl_post.clone(),
            urn: self.urn.clone(),
            year: self.year,
        }
    }

    /// Whether `neighbour` describes the same placement as this episode
    pub fn same_placement(&self, neighbour: &Neighbour) -> bool {
        self.rne == neighbour.rne
            && self.ls == neighbour.ls
            && self.place == neighbour.place
            && self.place_provider == neighbour.place_provider
            && self.pl_post == neighbour.pl_post
            && self.urn == neighbour.urn
    }
}

/// Group, order and link episodes
///
/// The result is in (authority, child, start date) order; `index` still
/// points at each episode's input row.
pub fn link_episodes(records: Vec<EpisodeRecord>) -> Vec<EpisodeRecord> {
    let mut groups: BTreeMap<(Option<String>, Option<String>), Vec<EpisodeRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.la.clone(), record.child.clone()))
            .or_default()
            .push(record);
    }

    let mut linked = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(|a, b| match (a.decom, b.decom) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let neighbours: Vec<Neighbour> = group.iter().map(EpisodeRecord::as_neighbour).collect();
        for (i, record) in group.iter_mut().enumerate() {
            if i > 0 {
                record.previous = neighbours[i - 1].clone();
            }
            if let Some(next) = neighbours.get(i + 1) {
                record.next = next.clone();
            }
        }
        linked.extend(group);
    }

    linked
}

/// Latest submission year per authority
pub fn latest_years(records: &[EpisodeRecord]) -> BTreeMap<Option<String>, i64> {
    let mut latest: BTreeMap<Option<String>, i64> = BTreeMap::new();
    for record in records {
        if let Some(year) = record.year {
            latest
                .entry(record.la.clone())
                .and_modify(|max| *max = (*max).max(year))
                .or_insert(year);
        }
    }
    latest
}
