use std::fmt::Write;

use crate::dashboard::DashboardView;
use crate::db::Snapshot;
use crate::models::TIMESTAMP_FORMAT;

pub fn build_report(view: &DashboardView, snapshot: &Snapshot, top: usize) -> String {
    let mut output = String::new();
    let filters = &view.filters;

    let _ = writeln!(output, "# Lead Service KPI Report");
    let period = if filters.is_unbounded() {
        "no data".to_string()
    } else {
        format!("{} to {}", filters.start, filters.end)
    };
    let _ = writeln!(
        output,
        "Period: {period} | project: {} | agent: {}",
        filters.project.label(),
        filters.agent.label()
    );
    let _ = writeln!(
        output,
        "Snapshot loaded {}",
        snapshot.loaded_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(notice) = &snapshot.notice {
        let _ = writeln!(output);
        let _ = writeln!(output, "> Error: {notice}");
    }
    if snapshot.dropped_rows > 0 {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "> {} source rows were skipped (unreadable timestamp, id or duplicate id).",
            snapshot.dropped_rows
        );
    }

    let _ = writeln!(output);
    if view.is_empty() {
        let _ = writeln!(output, "No data found for this selection.");
        return output;
    }

    let kpis = &view.kpis;
    let _ = writeln!(output, "## Headline");
    let _ = writeln!(output, "- Total services: {}", kpis.total);
    let _ = writeln!(
        output,
        "- First-lot purchases: {} ({:.1}%)",
        kpis.conversions, kpis.conversion_rate
    );
    let _ = writeln!(
        output,
        "- High interest: {} ({:.1}%)",
        kpis.high_interest_count, kpis.high_interest_rate
    );
    let _ = writeln!(
        output,
        "- Average rating (1-5): {:.1} from {} ratings",
        kpis.average_score, kpis.rated_count
    );
    let _ = writeln!(
        output,
        "- Top agent: {}",
        kpis.top_agent_by_volume.as_deref().unwrap_or("-")
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Project");
    for entry in &view.project_volume {
        let _ = writeln!(output, "- {}: {}", entry.name, entry.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Agent");
    for entry in view.agent_volume.iter().take(top) {
        let _ = writeln!(output, "- {}: {}", entry.name, entry.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Agent Ratings");
    if view.agent_quality.is_empty() {
        let _ = writeln!(output, "No rated services in this selection.");
    } else {
        for quality in view.agent_quality.iter().take(top) {
            let _ = writeln!(
                output,
                "- {}: {:.2} across {} ratings",
                quality.agent_name, quality.mean_score, quality.rated_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rating Distribution");
    for bucket in &view.rating_distribution {
        let _ = writeln!(output, "- {} stars: {}", bucket.score, bucket.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Interest Level");
    for share in &view.interest_distribution {
        let _ = writeln!(
            output,
            "- {}: {} ({:.1}%)",
            share.interest_level.label(),
            share.count,
            share.share
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Conversion by Interest");
    for row in &view.interest_conversion {
        let _ = writeln!(
            output,
            "- {} / purchased {}: {}",
            row.interest_level.label(),
            row.purchased_first_lot.label(),
            row.count
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Services");
    for record in view.records.iter().take(top) {
        let _ = writeln!(
            output,
            "- #{} {} {} with {} ({}, rating {})",
            record.id,
            record.timestamp.format(TIMESTAMP_FORMAT),
            record.lead_name,
            record.agent_name,
            record.project,
            record.satisfaction_score
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use crate::filter::tests::record;
    use crate::filter::FilterParams;
    use crate::kpi::TieBreak;
    use chrono::NaiveDate;

    #[test]
    fn report_lists_headline_and_rankings() {
        let mut rated = record(2, "2025-09-02", "Bruno", "Sol");
        rated.satisfaction_score = 5;
        let records = vec![record(1, "2025-09-01", "Ana", "Sol"), rated];
        let snapshot = Snapshot {
            records: records.clone(),
            dropped_rows: 0,
            notice: None,
            loaded_at: chrono::Local::now(),
        };
        let filters = FilterParams::covering(&records);
        let view = DashboardView::build(&records, filters, TieBreak::default());

        let report = build_report(&view, &snapshot, 10);
        assert!(report.contains("- Total services: 2"));
        assert!(report.contains("- Bruno: 5.00 across 1 ratings"));
        assert!(report.contains("- Top agent: Ana"));
        assert!(report.contains("- 5 stars: 1"));
    }

    #[test]
    fn failed_snapshot_renders_notice_and_empty_state() {
        let snapshot = Snapshot::failed(DashboardError::DataSourceUnavailable(
            "DATABASE_URL is not set".into(),
        ));
        let view = DashboardView::build(&[], FilterParams::covering(&[]), TieBreak::default());

        let report = build_report(&view, &snapshot, 10);
        assert!(report.contains("> Error: data source unavailable: DATABASE_URL is not set"));
        assert!(report.contains("Period: no data | project: All | agent: All"));
        assert!(!report.contains(&NaiveDate::MIN.to_string()));
        assert!(report.contains("No data found for this selection."));
        assert!(!report.contains("## Headline"));
    }
}
