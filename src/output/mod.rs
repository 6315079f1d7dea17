//! Flat-file (CSV) output sink

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::info;

use crate::models::{RawRecord, ScrapedDataset};
use crate::traits::OutputSink;

/// Writes the dataset as CSV with a header row of field names. Absent
/// values become empty cells.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OutputSink for CsvSink {
    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }

    async fn save(&self, fields: &[String], dataset: &ScrapedDataset) -> Result<()> {
        let mut buffer = Vec::new();
        write_dataset(&mut buffer, fields, dataset)?;
        tokio::fs::write(&self.path, buffer)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        info!("Wrote {} records to {}", dataset.len(), self.path.display());
        Ok(())
    }
}

/// Serialize `dataset` projected onto `fields`
pub fn write_dataset<W: Write>(writer: W, fields: &[String], dataset: &ScrapedDataset) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(fields)?;
    for record in dataset.records() {
        csv.write_record(record.project(fields).map(|v| v.unwrap_or("")))?;
    }
    csv.flush()?;
    Ok(())
}

/// Parse a file written by [`CsvSink`] back into records ordered by `fields`.
/// Empty cells come back absent.
pub fn read_dataset(path: &Path, fields: &[String]) -> Result<ScrapedDataset> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    parse_dataset(file, fields)
}

pub fn parse_dataset<R: Read>(reader: R, fields: &[String]) -> Result<ScrapedDataset> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = csv.headers()?.clone();
    let columns = fields
        .iter()
        .map(|field| {
            headers
                .iter()
                .position(|h| h == field)
                .ok_or_else(|| anyhow!("column `{field}` missing from header"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut dataset = ScrapedDataset::new();
    for row in csv.records() {
        let row = row?;
        let record: RawRecord = fields
            .iter()
            .zip(&columns)
            .map(|(field, &i)| {
                let value = row.get(i).filter(|v| !v.is_empty()).map(String::from);
                (field.as_str(), value)
            })
            .collect();
        dataset.push(record);
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<String> {
        vec!["title".into(), "note".into()]
    }

    #[test]
    fn header_follows_field_order_and_absent_is_empty() {
        let mut dataset = ScrapedDataset::new();
        dataset.push([("note", Some("a, \"quoted\"".to_string())), ("title", None)].into_iter().collect());

        let mut out = Vec::new();
        write_dataset(&mut out, &fields(), &dataset).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "title,note\n,\"a, \"\"quoted\"\"\"\n"
        );
    }

    #[test]
    fn parse_rejects_missing_columns() {
        let err = parse_dataset("title\nx\n".as_bytes(), &fields()).unwrap_err();
        assert!(err.to_string().contains("note"));
    }
}
