use crate::errors::OpError;
use bson::Bson;

/// A named-column record. Column names are strings by construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataRow {
    columns: Vec<String>,
    values: Vec<Bson>,
}

impl DataRow {
    /// # Errors
    /// Returns `OpError::Parse` when the column and value counts differ.
    pub fn new(columns: Vec<String>, values: Vec<Bson>) -> Result<Self, OpError> {
        if columns.len() != values.len() {
            return Err(OpError::Parse(format!(
                "row has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Build a row from a CSV record. Missing headers fall back to `field_{i}`.
    #[must_use]
    pub fn from_csv_record(
        headers: &csv::StringRecord,
        record: &csv::StringRecord,
        infer: bool,
    ) -> Self {
        let mut columns = Vec::with_capacity(record.len());
        let mut values = Vec::with_capacity(record.len());
        for (i, field) in record.iter().enumerate() {
            let name = headers.get(i).map_or_else(|| format!("field_{i}"), str::to_string);
            columns.push(name);
            values.push(field_to_bson(field, infer));
        }
        Self { columns, values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Bson)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    pub(crate) fn into_columns(self) -> impl Iterator<Item = (String, Bson)> {
        self.columns.into_iter().zip(self.values)
    }
}

pub fn field_to_bson(field: &str, infer: bool) -> Bson {
    if !infer {
        return Bson::String(field.to_string());
    }
    if let Ok(i) = field.parse::<i64>() {
        return Bson::Int64(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        return Bson::Double(f);
    }
    match field.to_lowercase().as_str() {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        _ => Bson::String(field.to_string()),
    }
}
