//! ReturnKit Episodes
//!
//! Rule-based repair of children's care episodes: open episodes in older
//! returns are closed, and episodes that overlap the next year's return are
//! realigned. Every touched row records the rules applied in `Episode_source`.

pub mod episode;
pub mod rules;
pub mod engine;

pub use episode::{link_episodes, latest_years, EpisodeRecord, Neighbour, EPISODE_SOURCE, ORIGINAL};
pub use rules::{fiscal_year_end, EpisodeFlags, Stage1Rule, Stage2Rule};
pub use engine::{EpisodeRepairEngine, RepairOutcome, RepairSummary};

/// Errors raised by episode repair
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EpisodeError {
    #[error("Episodes table has no {0} column")]
    MissingColumn(String),
}
