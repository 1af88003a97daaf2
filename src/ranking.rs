use std::cmp::Ordering;
use std::collections::HashMap;

use crate::kpi::{percentage, rated_subset};
use crate::models::{
    AgentQuality, InterestConversion, InterestLevel, InterestShare, Purchase, RatingBucket,
    ServiceRecord, VolumeEntry,
};

fn count_by<'a>(
    records: &'a [ServiceRecord],
    key: impl Fn(&'a ServiceRecord) -> &'a str,
) -> Vec<VolumeEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(key(record)).or_default() += 1;
    }

    let mut entries: Vec<VolumeEntry> = counts
        .into_iter()
        .map(|(name, count)| VolumeEntry {
            name: name.to_string(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries
}

pub fn project_volume(records: &[ServiceRecord]) -> Vec<VolumeEntry> {
    count_by(records, |r| r.project.as_str())
}

/// Full per-agent ranking, highest volume first. `limit` truncates for
/// display.
pub fn agent_volume(records: &[ServiceRecord], limit: Option<usize>) -> Vec<VolumeEntry> {
    let mut entries = count_by(records, |r| r.agent_name.as_str());
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    entries
}

/// Mean rating per agent over rated records only. Agents without a single
/// rated record never appear.
pub fn agent_quality(records: &[ServiceRecord]) -> Vec<AgentQuality> {
    let mut totals: HashMap<&str, (usize, u64)> = HashMap::new();
    for record in rated_subset(records) {
        let entry = totals.entry(record.agent_name.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u64::from(record.satisfaction_score);
    }

    let mut ranking: Vec<AgentQuality> = totals
        .into_iter()
        .filter(|(_, (count, _))| *count > 0)
        .map(|(agent, (count, sum))| AgentQuality {
            agent_name: agent.to_string(),
            mean_score: sum as f64 / count as f64,
            rated_count: count,
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.mean_score
            .partial_cmp(&a.mean_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.rated_count.cmp(&a.rated_count))
            .then_with(|| a.agent_name.cmp(&b.agent_name))
    });
    ranking
}

/// Histogram of ratings 1 through 5. Unrated records are not counted.
pub fn rating_distribution(records: &[ServiceRecord]) -> [RatingBucket; 5] {
    let mut buckets: [RatingBucket; 5] = std::array::from_fn(|i| RatingBucket {
        score: i as u8 + 1,
        count: 0,
    });
    for record in rated_subset(records) {
        if let Some(bucket) = buckets.get_mut(usize::from(record.satisfaction_score) - 1) {
            bucket.count += 1;
        }
    }
    buckets
}

/// Count and share of total per interest level present.
pub fn interest_distribution(records: &[ServiceRecord]) -> Vec<InterestShare> {
    let total = records.len();
    InterestLevel::ALL
        .into_iter()
        .map(|level| {
            let count = records.iter().filter(|r| r.interest_level == level).count();
            InterestShare {
                interest_level: level,
                count,
                share: percentage(count, total),
            }
        })
        .filter(|share| share.count > 0)
        .collect()
}

/// Long-form interest x purchase cross-tab: a Yes and a No triple for every
/// interest level present, zero counts included.
pub fn interest_conversion(records: &[ServiceRecord]) -> Vec<InterestConversion> {
    let mut rows = Vec::new();
    for level in InterestLevel::ALL {
        let in_level: Vec<&ServiceRecord> = records
            .iter()
            .filter(|r| r.interest_level == level)
            .collect();
        if in_level.is_empty() {
            continue;
        }
        for purchase in [Purchase::Yes, Purchase::No] {
            rows.push(InterestConversion {
                interest_level: level,
                purchased_first_lot: purchase,
                count: in_level.iter().filter(|r| r.purchased_first_lot == purchase).count(),
            });
        }
    }
    rows
}
