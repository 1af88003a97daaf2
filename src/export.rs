use std::io::Write;

use serde_json::Value;

use crate::error::DashboardError;
use crate::models::{ColumnMap, Field, ServiceRecord};

pub const DEFAULT_EXPORT_NAME: &str = "kpis_araguaia.csv";

/// Fields shown first in raw listings and exports.
pub const PREFERRED_FIELDS: [Field; 7] = [
    Field::Id,
    Field::Timestamp,
    Field::LeadName,
    Field::SatisfactionScore,
    Field::AgentName,
    Field::Project,
    Field::PurchasedFirstLot,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportColumn {
    Field(Field),
    Extra(String),
}

/// Column order for raw output: preferred fields, then the remaining mapped
/// fields, then unmapped source columns in the order they were first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    pub columns: Vec<ExportColumn>,
}

impl ExportLayout {
    pub fn for_records(records: &[ServiceRecord]) -> Self {
        let mut columns: Vec<ExportColumn> = PREFERRED_FIELDS
            .iter()
            .copied()
            .map(ExportColumn::Field)
            .collect();
        columns.extend(
            Field::ALL
                .into_iter()
                .filter(|field| !PREFERRED_FIELDS.contains(field))
                .map(ExportColumn::Field),
        );

        for record in records {
            for (name, _) in &record.extra {
                let column = ExportColumn::Extra(name.clone());
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }

        Self { columns }
    }

    pub fn header<'a>(&'a self, names: &'a ColumnMap) -> Vec<&'a str> {
        self.columns
            .iter()
            .map(|column| match column {
                ExportColumn::Field(field) => names.name(*field),
                ExportColumn::Extra(name) => name.as_str(),
            })
            .collect()
    }

    pub fn row(&self, record: &ServiceRecord, names: &ColumnMap) -> Vec<String> {
        let raw = record.to_raw(names);
        self.header(names)
            .into_iter()
            .map(|column| raw.get(column).map(cell).unwrap_or_default())
            .collect()
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn write_csv<W: Write>(
    records: &[ServiceRecord],
    names: &ColumnMap,
    writer: W,
) -> Result<(), DashboardError> {
    let layout = ExportLayout::for_records(records);
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(layout.header(names))
        .map_err(|e| DashboardError::Export(e.to_string()))?;
    for record in records {
        csv_writer
            .write_record(layout.row(record, names))
            .map_err(|e| DashboardError::Export(e.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|e| DashboardError::Export(e.to_string()))?;
    Ok(())
}

pub fn to_csv_bytes(
    records: &[ServiceRecord],
    names: &ColumnMap,
) -> Result<Vec<u8>, DashboardError> {
    let mut buffer = Vec::new();
    write_csv(records, names, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::record;
    use crate::models::Purchase;
    use serde_json::json;

    #[test]
    fn header_puts_preferred_fields_first() {
        let layout = ExportLayout::for_records(&[]);
        let names = ColumnMap::default();
        let header = layout.header(&names);
        assert_eq!(
            header,
            vec![
                "id",
                "data_hora",
                "nome",
                "nota_atendimento",
                "nome_corretor",
                "loteamento",
                "comprou_1o_lote",
                "cidade",
                "nivel_interesse",
                "foi_atendido",
            ]
        );
    }

    #[test]
    fn extra_columns_follow_in_first_seen_order() {
        let mut first = record(1, "2025-07-01", "Ana", "Sol");
        first.extra = vec![("origem".into(), json!("site"))];
        let mut second = record(2, "2025-07-01", "Ana", "Sol");
        second.extra = vec![
            ("telefone".into(), json!(null)),
            ("origem".into(), json!("radio")),
        ];

        let layout = ExportLayout::for_records(&[first, second.clone()]);
        let names = ColumnMap::default();
        let header = layout.header(&names);
        assert_eq!(&header[10..], &["origem", "telefone"]);

        let row = layout.row(&second, &names);
        assert_eq!(row[10], "radio");
        assert_eq!(row[11], "");
    }

    #[test]
    fn csv_has_one_line_per_record_plus_header() {
        let mut sold = record(1, "2025-07-01", "Ana", "Sol");
        sold.purchased_first_lot = Purchase::Yes;
        sold.satisfaction_score = 5;
        sold.city = Some("Toledo, PR".into());
        let records = vec![sold, record(2, "2025-07-02", "Bruno", "Lago")];

        let bytes = to_csv_bytes(&records, &ColumnMap::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,data_hora,nome,nota_atendimento"));
        assert_eq!(
            lines[1],
            "1,2025-07-01 23:59:00,Lead 1,5,Ana,Sol,Yes,\"Toledo, PR\",Unclassified,"
        );
    }

    #[test]
    fn empty_export_is_just_the_header() {
        let bytes = to_csv_bytes(&[], &ColumnMap::default()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().lines().count(), 1);
    }
}
