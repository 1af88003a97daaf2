use serde::Serialize;

use crate::filter::{apply_filters, FilterParams};
use crate::kpi::{self, TieBreak};
use crate::models::{
    AgentQuality, InterestConversion, InterestShare, KpiSummary, RatingBucket, ServiceRecord,
    VolumeEntry,
};
use crate::ranking;

/// Everything the presentation layer renders for one filter selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub filters: FilterParams,
    pub kpis: KpiSummary,
    pub project_volume: Vec<VolumeEntry>,
    pub agent_volume: Vec<VolumeEntry>,
    pub agent_quality: Vec<AgentQuality>,
    pub rating_distribution: [RatingBucket; 5],
    pub interest_distribution: Vec<InterestShare>,
    pub interest_conversion: Vec<InterestConversion>,
    /// Filtered records, newest first.
    pub records: Vec<ServiceRecord>,
}

impl DashboardView {
    pub fn build(snapshot: &[ServiceRecord], filters: FilterParams, tie_break: TieBreak) -> Self {
        let filtered = apply_filters(snapshot, &filters);
        Self::from_filtered(filtered, filters, tie_break)
    }

    pub fn from_filtered(
        mut filtered: Vec<ServiceRecord>,
        filters: FilterParams,
        tie_break: TieBreak,
    ) -> Self {
        let kpis = kpi::summarize(&filtered, tie_break);
        let project_volume = ranking::project_volume(&filtered);
        let agent_volume = ranking::agent_volume(&filtered, None);
        let agent_quality = ranking::agent_quality(&filtered);
        let rating_distribution = ranking::rating_distribution(&filtered);
        let interest_distribution = ranking::interest_distribution(&filtered);
        let interest_conversion = ranking::interest_conversion(&filtered);

        filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Self {
            filters,
            kpis,
            project_volume,
            agent_volume,
            agent_quality,
            rating_distribution,
            interest_distribution,
            interest_conversion,
            records: filtered,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::record;
    use crate::filter::Selection;
    use crate::models::{ColumnMap, RawRow};
    use crate::normalize::normalize_rows;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn raw(fields: Value) -> RawRow {
        match fields {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn raw_rows_flow_through_to_headline_kpis() {
        let rows = vec![
            raw(json!({
                "id": 1,
                "data_hora": "2025-08-01 09:00:00",
                "nota_atendimento": 5,
                "comprou_1o_lote": "Sim",
                "nivel_interesse": "Alto",
            })),
            raw(json!({
                "id": 2,
                "data_hora": "2025-08-01 10:00:00",
                "nota_atendimento": 0,
                "comprou_1o_lote": "Não",
                "nivel_interesse": "Baixo",
            })),
            raw(json!({
                "id": 3,
                "data_hora": "2025-08-02 11:00:00",
                "nota_atendimento": null,
                "comprou_1o_lote": "Sim",
                "nivel_interesse": "Alto",
            })),
        ];

        let normalized = normalize_rows(&rows, &ColumnMap::default()).unwrap();
        let scores: Vec<u8> = normalized
            .records
            .iter()
            .map(|r| r.satisfaction_score)
            .collect();
        assert_eq!(scores, vec![5, 0, 0]);

        let filters = FilterParams::covering(&normalized.records);
        let view = DashboardView::build(&normalized.records, filters, TieBreak::default());
        assert_eq!(view.kpis.total, 3);
        assert_eq!(view.kpis.conversions, 2);
        assert!((view.kpis.conversion_rate - 66.666).abs() < 0.1);
        assert_eq!(view.kpis.rated_count, 1);
        assert_eq!(view.kpis.average_score, 5.0);
        assert_eq!(view.kpis.high_interest_count, 2);
        assert_eq!(view.rating_distribution[4].count, 1);
    }

    #[test]
    fn view_is_built_from_the_filtered_subset() {
        let mut rated = record(2, "2025-06-03", "Bruno", "Sol");
        rated.satisfaction_score = 4;
        let snapshot = vec![
            record(1, "2025-06-01", "Ana", "Sol"),
            rated,
            record(3, "2025-06-02", "Ana", "Lago"),
        ];
        let filters = FilterParams::covering(&snapshot).with_project(Selection::parse("Sol"));

        let view = DashboardView::build(&snapshot, filters, TieBreak::default());
        assert_eq!(view.kpis.total, 2);
        assert_eq!(view.kpis.rated_count, 1);
        assert_eq!(view.project_volume.len(), 1);
        assert_eq!(view.agent_quality.len(), 1);
        let ids: Vec<i64> = view.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn empty_snapshot_renders_an_empty_view() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let view = DashboardView::build(&[], FilterParams::new(day, day), TieBreak::default());
        assert!(view.is_empty());
        assert_eq!(view.kpis.conversion_rate, 0.0);
        assert!(view.agent_volume.is_empty());
        let rated: usize = view.rating_distribution.iter().map(|b| b.count).sum();
        assert_eq!(rated, 0);
        assert!(view.interest_conversion.is_empty());
    }

    #[test]
    fn view_serializes_camel_case() {
        let snapshot = vec![record(1, "2025-06-01", "Ana", "Sol")];
        let filters = FilterParams::covering(&snapshot);
        let view = DashboardView::build(&snapshot, filters, TieBreak::default());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["kpis"]["topAgentByVolume"], "Ana");
        assert_eq!(json["records"][0]["agentName"], "Ana");
    }
}
