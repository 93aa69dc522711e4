//! Episode repair over a whole episodes table

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use returnkit_core::{Table, Value};

use crate::episode::{
    date_value, latest_years, link_episodes, EpisodeRecord, CHILD, DEC, DECOM, EPISODE_SOURCE, ORIGINAL, REASON_PLACE_CHANGE,
    REC,
};
use crate::rules::{EpisodeFlags, Stage1Rule, Stage2Rule};
use crate::EpisodeError;

/// How many episodes each rule touched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    /// Episodes in the input table
    pub episodes: usize,

    /// Rule name -> episodes it applied to
    pub rule_counts: BTreeMap<String, usize>,
}

impl RepairSummary {
    fn record(&mut self, rule: &str) {
        *self.rule_counts.entry(rule.to_string()).or_insert(0) += 1;
    }

    /// Applications of `rule`
    pub fn count(&self, rule: &str) -> usize {
        self.rule_counts.get(rule).copied().unwrap_or(0)
    }
}

/// Result of a repair run
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    /// Input columns in input order, then any added ones; rows in input order
    pub table: Table,

    pub summary: RepairSummary,
}

/// Two-stage repair of open and overlapping episodes
#[derive(Debug, Clone, Default)]
pub struct EpisodeRepairEngine;

impl EpisodeRepairEngine {
    pub fn new() -> Self {
        Self
    }

    /// Repair `table`
    ///
    /// Rows the rules cannot make sense of are left unchanged; only a table
    /// without a `CHILD` or `DECOM` column is rejected.
    pub fn repair(&self, table: &Table) -> Result<RepairOutcome, EpisodeError> {
        for required in [CHILD, DECOM] {
            if !table.columns.iter().any(|c| c == required) {
                return Err(EpisodeError::MissingColumn(required.to_string()));
            }
        }

        let records: Vec<EpisodeRecord> = table
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| EpisodeRecord::from_row(index, row))
            .collect();
        let mut linked = link_episodes(records);
        let latest = latest_years(&linked);

        let mut summary = RepairSummary { episodes: table.len(), ..Default::default() };

        for record in linked.iter_mut() {
            let flags = EpisodeFlags::evaluate(record, latest.get(&record.la).copied());
            if let Some(rule) = Stage1Rule::select(&flags) {
                if rule.apply(record) {
                    tracing::debug!(row = record.index, child = ?record.child, rule = %rule, "stage 1");
                    summary.record(rule.name());
                } else {
                    tracing::warn!(row = record.index, child = ?record.child, rule = %rule, "no closing date; episode left open");
                }
            }
        }

        for record in linked.iter_mut() {
            if let Some(rule) = Stage2Rule::select(record) {
                tracing::debug!(row = record.index, child = ?record.child, rule = %rule, "stage 2");
                rule.apply(record);
                summary.record(rule.name());
            }
        }

        for (rule, count) in &summary.rule_counts {
            tracing::info!(rule = %rule, episodes = count, "applied episode rule");
        }

        Ok(RepairOutcome { table: write_back(table, &linked), summary })
    }
}

fn write_back(table: &Table, records: &[EpisodeRecord]) -> Table {
    let mut output = table.clone();
    for column in [DEC, REC, EPISODE_SOURCE] {
        if !output.columns.iter().any(|c| c == column) {
            output.columns.push(column.to_string());
            for row in output.rows.iter_mut() {
                row.entry(column.to_string()).or_insert(Value::Blank);
            }
        }
    }

    for record in records {
        let Some(row) = output.rows.get_mut(record.index) else {
            continue;
        };

        row.insert(EPISODE_SOURCE.to_string(), Value::text(record.source.clone()));
        if record.source == ORIGINAL {
            continue;
        }

        // Cells the rules left alone keep their original text, parsable or not
        if row.get(DEC).and_then(date_value) != record.dec {
            row.insert(DEC.to_string(), record.dec.map(Value::Date).unwrap_or_default());
        }
        let rec = row.get(REC).filter(|v| !v.is_blank()).map(|v| v.render().trim().to_string());
        if rec != record.rec {
            row.insert(REC.to_string(), Value::from(record.rec.clone()));
        }
        if let Some(reason) = &record.reason_place_change {
            row.insert(REASON_PLACE_CHANGE.to_string(), Value::text(reason.clone()));
        }
    }

    output
}
