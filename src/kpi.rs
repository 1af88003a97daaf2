use std::collections::{BTreeMap, HashMap};

use clap::ValueEnum;

use crate::models::{InterestLevel, KpiSummary, ServiceRecord};

/// How `top_agent_by_volume` resolves agents with equal volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TieBreak {
    /// Alphabetically first agent name.
    #[default]
    Lexicographic,
    /// Agent that appears first in the record set.
    FirstEncountered,
}

/// `part / whole * 100`, or 0 when `whole` is 0.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Records carrying a real rating (score 1-5).
pub fn rated_subset(records: &[ServiceRecord]) -> impl Iterator<Item = &ServiceRecord> {
    records.iter().filter(|record| record.is_rated())
}

pub fn summarize(records: &[ServiceRecord], tie_break: TieBreak) -> KpiSummary {
    let total = records.len();
    let conversions = records.iter().filter(|r| r.is_conversion()).count();
    let high_interest_count = records
        .iter()
        .filter(|r| r.interest_level == InterestLevel::High)
        .count();

    let (rated_count, score_sum) = rated_subset(records).fold((0usize, 0u64), |(count, sum), r| {
        (count + 1, sum + u64::from(r.satisfaction_score))
    });
    let average_score = if rated_count == 0 {
        0.0
    } else {
        score_sum as f64 / rated_count as f64
    };

    KpiSummary {
        total,
        conversions,
        conversion_rate: percentage(conversions, total),
        high_interest_count,
        high_interest_rate: percentage(high_interest_count, total),
        average_score,
        rated_count,
        top_agent_by_volume: top_agent_by_volume(records, tie_break),
    }
}

pub fn top_agent_by_volume(records: &[ServiceRecord], tie_break: TieBreak) -> Option<String> {
    match tie_break {
        TieBreak::Lexicographic => {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for record in records {
                *counts.entry(record.agent_name.as_str()).or_default() += 1;
            }
            pick_strict_max(counts)
        }
        TieBreak::FirstEncountered => {
            let mut order: Vec<&str> = Vec::new();
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for record in records {
                let count = counts.entry(record.agent_name.as_str()).or_default();
                if *count == 0 {
                    order.push(record.agent_name.as_str());
                }
                *count += 1;
            }
            pick_strict_max(order.into_iter().map(|agent| (agent, counts[agent])))
        }
    }
}

// Earlier entries win ties.
fn pick_strict_max<'a>(counts: impl IntoIterator<Item = (&'a str, usize)>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for (agent, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((agent, count));
        }
    }
    best.map(|(agent, _)| agent.to_string())
}
