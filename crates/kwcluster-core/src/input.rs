//! Tabular keyword input parsing.
//!
//! Expected layout: a header row, then `keyword, search_volume[, word_count]`.
//! Row order is preserved; it becomes each record's `sequence_index`.

use std::io::Read;
use std::path::Path;

use crate::defaults::MAX_SEARCH_VOLUME;
use crate::error::{Error, Result};
use crate::models::KeywordInput;

/// Parse keyword rows from any CSV reader.
///
/// Rows with an empty keyword are skipped. A volume that is missing or not a
/// number becomes 0; an unreadable word count becomes `None`. Fails with
/// [`Error::InvalidInput`] when no usable rows remain or a volume exceeds
/// [`MAX_SEARCH_VOLUME`].
pub fn parse_keywords<R: Read>(reader: R) -> Result<Vec<KeywordInput>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let keyword = record.get(0).unwrap_or_default().trim();
        if keyword.is_empty() {
            continue;
        }
        let search_volume = record.get(1).and_then(parse_number).unwrap_or(0).max(0);
        if search_volume > MAX_SEARCH_VOLUME {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            return Err(Error::InvalidInput(format!(
                "Search volume {} for \"{}\" on line {} exceeds the maximum of {}",
                search_volume, keyword, line, MAX_SEARCH_VOLUME
            )));
        }
        let word_count = record
            .get(2)
            .and_then(parse_number)
            .and_then(|n| i32::try_from(n).ok());
        rows.push(KeywordInput {
            keyword: keyword.to_string(),
            search_volume,
            word_count,
        });
    }

    if rows.is_empty() {
        return Err(Error::InvalidInput(
            "Input contains no keyword rows".to_string(),
        ));
    }
    Ok(rows)
}

/// Parse a keyword file from disk.
pub fn parse_keyword_file(path: impl AsRef<Path>) -> Result<Vec<KeywordInput>> {
    let file = std::fs::File::open(path.as_ref())?;
    parse_keywords(file)
}

/// Integers, and spreadsheet-style floats like `"500.0"`, truncated.
fn parse_number(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_basic_rows_in_order() {
        let data = "keyword,volume,words\nshoes,500,1\nred shoes,300,2\n";
        let rows = parse_keywords(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].keyword, "shoes");
        assert_eq!(rows[0].search_volume, 500);
        assert_eq!(rows[0].word_count, Some(1));
        assert_eq!(rows[1].keyword, "red shoes");
    }

    #[test]
    fn test_non_numeric_volume_becomes_zero() {
        let data = "keyword,volume\nshoes,n/a\nboots,\n";
        let rows = parse_keywords(data.as_bytes()).unwrap();
        assert_eq!(rows[0].search_volume, 0);
        assert_eq!(rows[1].search_volume, 0);
    }

    #[test]
    fn test_missing_columns_are_tolerated() {
        let data = "keyword,volume,words\nshoes\nboots,12\n";
        let rows = parse_keywords(data.as_bytes()).unwrap();
        assert_eq!(rows[0].search_volume, 0);
        assert_eq!(rows[0].word_count, None);
        assert_eq!(rows[1].search_volume, 12);
        assert_eq!(rows[1].word_count, None);
    }

    #[test]
    fn test_float_volume_is_truncated() {
        let data = "keyword,volume,words\nshoes,500.0,2.0\n";
        let rows = parse_keywords(data.as_bytes()).unwrap();
        assert_eq!(rows[0].search_volume, 500);
        assert_eq!(rows[0].word_count, Some(2));
    }

    #[test]
    fn test_negative_volume_clamped() {
        let data = "keyword,volume\nshoes,-5\n";
        let rows = parse_keywords(data.as_bytes()).unwrap();
        assert_eq!(rows[0].search_volume, 0);
    }

    #[test]
    fn test_oversized_volume_is_rejected() {
        let data = "keyword,volume\nshoes,9223372036854775807\nboots,1\n";
        let err = parse_keywords(data.as_bytes()).unwrap_err();
        match err {
            Error::InvalidInput(msg) => {
                assert!(msg.contains("shoes"));
                assert!(msg.contains("line 2"));
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }

        let data = format!("keyword,volume\nshoes,{}\n", MAX_SEARCH_VOLUME);
        let rows = parse_keywords(data.as_bytes()).unwrap();
        assert_eq!(rows[0].search_volume, MAX_SEARCH_VOLUME);
    }

    #[test]
    fn test_blank_keywords_skipped_and_trimmed() {
        let data = "keyword,volume\n  ,10\n  boots  ,20\n";
        let rows = parse_keywords(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keyword, "boots");
    }

    #[test]
    fn test_header_only_is_rejected() {
        let err = parse_keywords("keyword,volume\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_unicode_keywords() {
        let data = "کلمه,حجم\nخرید کفش,1200\n";
        let rows = parse_keywords(data.as_bytes()).unwrap();
        assert_eq!(rows[0].keyword, "خرید کفش");
        assert_eq!(rows[0].search_volume, 1200);
    }

    #[test]
    fn test_parse_keyword_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "keyword,volume").unwrap();
        writeln!(file, "shoes,500").unwrap();
        let rows = parse_keyword_file(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_parse_missing_file_is_io_error() {
        let err = parse_keyword_file("/nonexistent/kw.csv").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
