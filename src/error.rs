#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DashboardError {
    #[error("data source unavailable: {0}")]
    DataSourceUnavailable(String),

    #[error("query failed: {0}")]
    QueryFailure(String),

    #[error("unusable snapshot: {0}")]
    Schema(String),

    #[error("export failed: {0}")]
    Export(String),
}

impl DashboardError {
    /// Failures at the data-source boundary. These degrade the refresh to an
    /// empty snapshot instead of aborting it.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            DashboardError::DataSourceUnavailable(_)
                | DashboardError::QueryFailure(_)
                | DashboardError::Schema(_)
        )
    }
}
