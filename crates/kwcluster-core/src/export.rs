//! Tabular export of primary keywords.

use std::io::Write;

use serde::Serialize;

use crate::defaults::{AKW_SEPARATOR, LINK_SEPARATOR};
use crate::error::Result;
use crate::models::{KeywordRecord, MergedKeyword};

/// One exported row per primary keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub keyword: String,
    pub search_volume: i64,
    pub word_count: Option<i32>,
    /// Absorbed keyword with the highest original volume, as `keyword:volume`.
    pub top_akw: String,
    /// Remaining absorbed keywords in merge order.
    pub other_akws: String,
    pub links: String,
    pub search_intent: Option<String>,
    pub intent_type: Option<String>,
}

impl ExportRow {
    pub fn from_record(record: &KeywordRecord) -> Self {
        let (top, rest) = split_top_merged(&record.merged_keywords);
        Self {
            keyword: record.keyword.clone(),
            search_volume: record.search_volume,
            word_count: record.word_count,
            top_akw: top.map(ToString::to_string).unwrap_or_default(),
            other_akws: rest
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(AKW_SEPARATOR),
            links: record.result_links.join(LINK_SEPARATOR),
            search_intent: record.search_intent.clone(),
            intent_type: record.intent_type.clone(),
        }
    }
}

/// Highest-volume merged entry (earliest wins ties) and the rest in merge order.
fn split_top_merged(merged: &[MergedKeyword]) -> (Option<&MergedKeyword>, Vec<&MergedKeyword>) {
    let top_idx = merged
        .iter()
        .enumerate()
        .fold(None::<(usize, i64)>, |best, (idx, m)| match best {
            Some((_, vol)) if vol >= m.original_search_volume => best,
            _ => Some((idx, m.original_search_volume)),
        })
        .map(|(idx, _)| idx);

    match top_idx {
        Some(idx) => {
            let rest = merged
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, m)| m)
                .collect();
            (Some(&merged[idx]), rest)
        }
        None => (None, Vec::new()),
    }
}

/// Export rows for the primary records, in `sequence_index` order.
pub fn export_rows(records: &[KeywordRecord]) -> Vec<ExportRow> {
    let mut primaries: Vec<&KeywordRecord> = records.iter().filter(|r| r.is_primary()).collect();
    primaries.sort_by_key(|r| r.sequence_index);
    primaries.into_iter().map(ExportRow::from_record).collect()
}

/// Write rows as CSV with a header line.
pub fn write_csv<W: Write>(writer: W, rows: &[ExportRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Render the export for a job's records into an in-memory CSV document.
pub fn export_csv(records: &[KeywordRecord]) -> Result<Vec<u8>> {
    let rows = export_rows(records);
    let mut buf = Vec::new();
    write_csv(&mut buf, &rows)?;
    if rows.is_empty() {
        // csv only emits the header alongside the first record
        buf = header_line().into_bytes();
    }
    Ok(buf)
}

fn header_line() -> String {
    [
        "keyword",
        "search_volume",
        "word_count",
        "top_akw",
        "other_akws",
        "links",
        "search_intent",
        "intent_type",
    ]
    .join(",")
        + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classification, FetchOutcome, KeywordInput};
    use uuid::Uuid;

    fn record(seq: i32, keyword: &str, volume: i64, class: Classification) -> KeywordRecord {
        let mut rec = KeywordRecord::new(
            Uuid::nil(),
            seq,
            KeywordInput {
                keyword: keyword.to_string(),
                search_volume: volume,
                word_count: Some(2),
            },
        );
        rec.classification = class;
        rec
    }

    fn merged(keyword: &str, volume: i64) -> MergedKeyword {
        MergedKeyword {
            keyword: keyword.to_string(),
            original_search_volume: volume,
        }
    }

    #[test]
    fn test_only_primaries_exported_in_sequence_order() {
        let records = vec![
            record(2, "c", 10, Classification::Primary),
            record(0, "a", 10, Classification::Primary),
            record(1, "b", 10, Classification::Auxiliary),
        ];
        let rows = export_rows(&records);
        let names: Vec<_> = rows.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_top_akw_is_highest_volume() {
        let mut rec = record(0, "shoes", 500, Classification::Primary);
        rec.merged_keywords = vec![merged("x", 10), merged("y", 90), merged("z", 40)];
        let row = ExportRow::from_record(&rec);
        assert_eq!(row.top_akw, "y:90");
        assert_eq!(row.other_akws, "x:10 - z:40");
    }

    #[test]
    fn test_top_akw_tie_prefers_earliest() {
        let mut rec = record(0, "shoes", 500, Classification::Primary);
        rec.merged_keywords = vec![merged("x", 50), merged("y", 50)];
        let row = ExportRow::from_record(&rec);
        assert_eq!(row.top_akw, "x:50");
        assert_eq!(row.other_akws, "y:50");
    }

    #[test]
    fn test_no_merges_yields_empty_akw_columns() {
        let rec = record(0, "shoes", 500, Classification::Primary);
        let row = ExportRow::from_record(&rec);
        assert_eq!(row.top_akw, "");
        assert_eq!(row.other_akws, "");
    }

    #[test]
    fn test_links_joined_with_separator() {
        let mut rec = record(0, "shoes", 500, Classification::Primary);
        rec.fetch_outcome = Some(FetchOutcome::Success);
        rec.result_links = vec!["https://a".into(), "https://b".into()];
        let row = ExportRow::from_record(&rec);
        assert_eq!(row.links, "https://a -------------- https://b");
    }

    #[test]
    fn test_export_csv_has_header_and_rows() {
        let mut rec = record(0, "shoes", 800, Classification::Primary);
        rec.merged_keywords = vec![merged("sneakers", 300)];
        rec.search_intent = Some("commercial".into());
        let csv = String::from_utf8(export_csv(&[rec]).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "keyword,search_volume,word_count,top_akw,other_akws,links,search_intent,intent_type"
        );
        assert_eq!(lines.next().unwrap(), "shoes,800,2,sneakers:300,,,commercial,");
    }

    #[test]
    fn test_export_csv_empty_still_has_header() {
        let csv = String::from_utf8(export_csv(&[]).unwrap()).unwrap();
        assert!(csv.starts_with("keyword,search_volume"));
        assert_eq!(csv.lines().count(), 1);
    }
}
