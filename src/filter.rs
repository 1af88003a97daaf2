use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::ServiceRecord;

pub const ALL_LABEL: &str = "All";

/// A categorical filter. `All` is inactive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum Selection {
    #[default]
    All,
    Only(String),
}

impl Selection {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty()
            || value.eq_ignore_ascii_case(ALL_LABEL)
            || value.eq_ignore_ascii_case("todos")
        {
            Selection::All
        } else {
            Selection::Only(value.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(expected) => expected == value,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Selection::All => ALL_LABEL,
            Selection::Only(value) => value,
        }
    }
}

impl From<Option<&str>> for Selection {
    fn from(value: Option<&str>) -> Self {
        value.map(Selection::parse).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub project: Selection,
    pub agent: Selection,
}

impl FilterParams {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            project: Selection::All,
            agent: Selection::All,
        }
    }

    /// Whole period of the data set with no categorical filter. An empty set
    /// gets an unbounded range.
    pub fn covering(records: &[ServiceRecord]) -> Self {
        match date_bounds(records) {
            Some((start, end)) => Self::new(start, end),
            None => Self::new(NaiveDate::MIN, NaiveDate::MAX),
        }
    }

    /// True for the range [`covering`](Self::covering) gives an empty set.
    pub fn is_unbounded(&self) -> bool {
        self.start == NaiveDate::MIN && self.end == NaiveDate::MAX
    }

    pub fn with_project(mut self, project: Selection) -> Self {
        self.project = project;
        self
    }

    pub fn with_agent(mut self, agent: Selection) -> Self {
        self.agent = agent;
        self
    }

    /// Inclusive date range on the calendar date only, AND-ed with the
    /// active categorical filters.
    pub fn matches(&self, record: &ServiceRecord) -> bool {
        let date = record.timestamp.date();
        date >= self.start
            && date <= self.end
            && self.project.matches(&record.project)
            && self.agent.matches(&record.agent_name)
    }
}

pub fn apply_filters(records: &[ServiceRecord], params: &FilterParams) -> Vec<ServiceRecord> {
    records
        .iter()
        .filter(|record| params.matches(record))
        .cloned()
        .collect()
}

pub fn date_bounds(records: &[ServiceRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let start = records.iter().map(|r| r.timestamp.date()).min()?;
    let end = records.iter().map(|r| r.timestamp.date()).max()?;
    Some((start, end))
}

/// `All` followed by each project in first-encountered order.
pub fn project_options(records: &[ServiceRecord]) -> Vec<String> {
    let mut options = vec![ALL_LABEL.to_string()];
    for record in records {
        if !options[1..].contains(&record.project) {
            options.push(record.project.clone());
        }
    }
    options
}

/// `All` followed by the sorted union of the known roster and the agents in
/// the data.
pub fn agent_options(records: &[ServiceRecord], roster: &[String]) -> Vec<String> {
    let agents: BTreeSet<&str> = roster
        .iter()
        .map(String::as_str)
        .chain(records.iter().map(|r| r.agent_name.as_str()))
        .collect();

    std::iter::once(ALL_LABEL)
        .chain(agents)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{InterestLevel, Purchase};
    use proptest::prelude::*;

    pub(crate) fn record(id: i64, date: &str, agent: &str, project: &str) -> ServiceRecord {
        ServiceRecord {
            id,
            timestamp: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap(),
            lead_name: format!("Lead {id}"),
            agent_name: agent.to_string(),
            city: None,
            project: project.to_string(),
            purchased_first_lot: Purchase::No,
            interest_level: InterestLevel::Unclassified,
            was_attended: None,
            satisfaction_score: 0,
            extra: Vec::new(),
        }
    }

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn sample() -> Vec<ServiceRecord> {
        vec![
            record(1, "2025-03-01", "Ana", "Jardim Araguaia"),
            record(2, "2025-03-05", "Bruno", "Residencial Sol"),
            record(3, "2025-03-10", "Ana", "Residencial Sol"),
        ]
    }

    #[test]
    fn date_range_is_inclusive_on_calendar_days() {
        let records = sample();
        let params = FilterParams::new(day("2025-03-01"), day("2025-03-05"));
        let ids: Vec<i64> = apply_filters(&records, &params).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn categorical_filters_combine() {
        let records = sample();
        let params = FilterParams::covering(&records)
            .with_project(Selection::parse("Residencial Sol"))
            .with_agent(Selection::parse("Ana"));
        let ids: Vec<i64> = apply_filters(&records, &params).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn all_selection_is_inactive() {
        assert_eq!(Selection::parse("Todos"), Selection::All);
        assert_eq!(Selection::parse("all"), Selection::All);
        assert_eq!(Selection::from(None), Selection::All);
        let records = sample();
        let params = FilterParams::covering(&records).with_agent(Selection::All);
        assert_eq!(apply_filters(&records, &params).len(), 3);
    }

    #[test]
    fn inverted_range_yields_nothing() {
        let records = sample();
        let params = FilterParams::new(day("2025-03-10"), day("2025-03-01"));
        assert!(apply_filters(&records, &params).is_empty());
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let params = FilterParams::covering(&[]);
        assert!(apply_filters(&[], &params).is_empty());
        assert_eq!(date_bounds(&[]), None);
        assert!(params.is_unbounded());
        assert!(!FilterParams::covering(&sample()).is_unbounded());
    }

    #[test]
    fn options_list_all_first() {
        let records = sample();
        assert_eq!(
            project_options(&records),
            vec!["All", "Jardim Araguaia", "Residencial Sol"]
        );
        let roster = vec!["Carla".to_string(), "Ana".to_string()];
        assert_eq!(agent_options(&records, &roster), vec!["All", "Ana", "Bruno", "Carla"]);
    }

    proptest! {
        #[test]
        fn filtering_shrinks_and_is_idempotent(
            days in proptest::collection::vec(1u32..28, 0..30),
            start in 1u32..28,
            span in 0u32..10,
            agent in prop_oneof![Just("All"), Just("Ana"), Just("Bruno")],
        ) {
            let records: Vec<ServiceRecord> = days
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    let agent = if i % 2 == 0 { "Ana" } else { "Bruno" };
                    record(i as i64, &format!("2025-03-{d:02}"), agent, "Sol")
                })
                .collect();
            let start = NaiveDate::from_ymd_opt(2025, 3, start).unwrap();
            let params = FilterParams::new(start, start + chrono::Duration::days(span as i64))
                .with_agent(Selection::parse(agent));

            let once = apply_filters(&records, &params);
            let twice = apply_filters(&once, &params);
            prop_assert!(once.len() <= records.len());
            prop_assert_eq!(once, twice);
        }
    }
}
