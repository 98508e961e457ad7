//! CSV rows as served by the catalog.

use std::collections::HashMap;

use anyhow::Context;

/// One CSV record keyed by trimmed header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRow {
    fields: HashMap<String, String>,
}

impl CatalogRow {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into().trim().to_string(), v.into().trim().to_string()))
                .collect(),
        }
    }

    /// Value of `column`, or `""` when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Parse a catalog CSV document (header row first).
///
/// Headers and fields are trimmed. Rows shorter than the header simply lack
/// the trailing columns; longer rows drop the extra values.
pub fn parse_rows(text: &str) -> anyhow::Result<Vec<CatalogRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read catalog CSV header")?
        .clone();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to read catalog CSV record {}", index + 1))?;
        rows.push(CatalogRow::from_pairs(
            headers.iter().zip(record.iter()),
        ));
    }
    Ok(rows)
}
