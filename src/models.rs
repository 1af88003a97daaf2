use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

/// One row as delivered by a data source: column name to possibly-null value,
/// in source column order.
pub type RawRow = serde_json::Map<String, Value>;

pub const UNASSIGNED_AGENT: &str = "Unassigned/Organic";
pub const UNSPECIFIED_PROJECT: &str = "Unspecified";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Purchase {
    Yes,
    No,
}

impl Purchase {
    pub fn label(self) -> &'static str {
        match self {
            Purchase::Yes => "Yes",
            Purchase::No => "No",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterestLevel {
    Low,
    Medium,
    High,
    Unclassified,
}

impl InterestLevel {
    pub const ALL: [InterestLevel; 4] = [
        InterestLevel::Low,
        InterestLevel::Medium,
        InterestLevel::High,
        InterestLevel::Unclassified,
    ];

    pub fn label(self) -> &'static str {
        match self {
            InterestLevel::Low => "Low",
            InterestLevel::Medium => "Medium",
            InterestLevel::High => "High",
            InterestLevel::Unclassified => "Unclassified",
        }
    }
}

/// The fields of a [`ServiceRecord`] that map onto source columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Timestamp,
    LeadName,
    AgentName,
    City,
    Project,
    PurchasedFirstLot,
    InterestLevel,
    WasAttended,
    SatisfactionScore,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Id,
        Field::Timestamp,
        Field::LeadName,
        Field::AgentName,
        Field::City,
        Field::Project,
        Field::PurchasedFirstLot,
        Field::InterestLevel,
        Field::WasAttended,
        Field::SatisfactionScore,
    ];
}

/// Source column names for each record field. Defaults match the
/// `atendimentos` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub id: String,
    pub timestamp: String,
    pub lead_name: String,
    pub agent_name: String,
    pub city: String,
    pub project: String,
    pub purchased_first_lot: String,
    pub interest_level: String,
    pub was_attended: String,
    pub satisfaction_score: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            timestamp: "data_hora".to_string(),
            lead_name: "nome".to_string(),
            agent_name: "nome_corretor".to_string(),
            city: "cidade".to_string(),
            project: "loteamento".to_string(),
            purchased_first_lot: "comprou_1o_lote".to_string(),
            interest_level: "nivel_interesse".to_string(),
            was_attended: "foi_atendido".to_string(),
            satisfaction_score: "nota_atendimento".to_string(),
        }
    }
}

impl ColumnMap {
    pub fn name(&self, field: Field) -> &str {
        match field {
            Field::Id => &self.id,
            Field::Timestamp => &self.timestamp,
            Field::LeadName => &self.lead_name,
            Field::AgentName => &self.agent_name,
            Field::City => &self.city,
            Field::Project => &self.project,
            Field::PurchasedFirstLot => &self.purchased_first_lot,
            Field::InterestLevel => &self.interest_level,
            Field::WasAttended => &self.was_attended,
            Field::SatisfactionScore => &self.satisfaction_score,
        }
    }

    pub fn is_mapped(&self, column: &str) -> bool {
        Field::ALL.iter().any(|field| self.name(*field) == column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub lead_name: String,
    pub agent_name: String,
    pub city: Option<String>,
    pub project: String,
    pub purchased_first_lot: Purchase,
    pub interest_level: InterestLevel,
    pub was_attended: Option<bool>,
    pub satisfaction_score: u8,
    /// Unmapped source columns, in source order.
    #[serde(skip)]
    pub extra: Vec<(String, Value)>,
}

impl ServiceRecord {
    pub fn is_rated(&self) -> bool {
        self.satisfaction_score > 0
    }

    pub fn is_conversion(&self) -> bool {
        self.purchased_first_lot == Purchase::Yes
    }

    pub fn field_value(&self, field: Field) -> Value {
        match field {
            Field::Id => Value::from(self.id),
            Field::Timestamp => Value::from(self.timestamp.format(TIMESTAMP_FORMAT).to_string()),
            Field::LeadName => Value::from(self.lead_name.clone()),
            Field::AgentName => Value::from(self.agent_name.clone()),
            Field::City => self.city.clone().map(Value::from).unwrap_or(Value::Null),
            Field::Project => Value::from(self.project.clone()),
            Field::PurchasedFirstLot => Value::from(self.purchased_first_lot.label()),
            Field::InterestLevel => Value::from(self.interest_level.label()),
            Field::WasAttended => self.was_attended.map(Value::from).unwrap_or(Value::Null),
            Field::SatisfactionScore => Value::from(self.satisfaction_score),
        }
    }

    /// Maps the record back onto source columns using canonical labels.
    pub fn to_raw(&self, columns: &ColumnMap) -> RawRow {
        let mut row = RawRow::new();
        for field in Field::ALL {
            row.insert(columns.name(field).to_string(), self.field_value(field));
        }
        for (column, value) in &self.extra {
            row.insert(column.clone(), value.clone());
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub total: usize,
    pub conversions: usize,
    pub conversion_rate: f64,
    pub high_interest_count: usize,
    pub high_interest_rate: f64,
    pub average_score: f64,
    pub rated_count: usize,
    pub top_agent_by_volume: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeEntry {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQuality {
    pub agent_name: String,
    pub mean_score: f64,
    pub rated_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingBucket {
    pub score: u8,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestShare {
    pub interest_level: InterestLevel,
    pub count: usize,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestConversion {
    pub interest_level: InterestLevel,
    pub purchased_first_lot: Purchase,
    pub count: usize,
}
