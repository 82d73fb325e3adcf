//! JSON record source
//!
//! Reads records from `.jsonl`/`.ndjson` files (one object per line) or
//! `.json` files (one array). Objects may use either the snake-case field
//! names or the spreadsheet headers (`Article Title`, `Abstract`).

use sdk::errors::EngineError;
use sdk::source::{RecordSource, VecSource};
use sdk::types::Record;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

enum Inner {
    Lines {
        lines: Lines<BufReader<File>>,
        line_no: usize,
    },
    Buffered(VecSource),
}

/// Streaming source over a JSON Lines or JSON array file
pub struct JsonlRecordSource {
    inner: Inner,
    next_ordinal: usize,
    limit: Option<usize>,
    path: String,
}

impl JsonlRecordSource {
    /// Open `path`, yielding at most `limit` records
    pub fn open(path: &Path, limit: Option<usize>) -> Result<Self, EngineError> {
        let file = File::open(path).map_err(|e| {
            EngineError::RecordSource(format!("cannot open {}: {}", path.display(), e))
        })?;

        let is_array = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let inner = if is_array {
            let records: Vec<Record> = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                EngineError::RecordSource(format!("{} is not a JSON array of records: {}", path.display(), e))
            })?;
            Inner::Buffered(VecSource::new(records))
        } else {
            Inner::Lines {
                lines: BufReader::new(file).lines(),
                line_no: 0,
            }
        };

        Ok(Self {
            inner,
            next_ordinal: 1,
            limit,
            path: path.display().to_string(),
        })
    }

    fn read_next(&mut self) -> Result<Option<Record>, EngineError> {
        match &mut self.inner {
            Inner::Buffered(source) => source.next_record(),
            Inner::Lines { lines, line_no } => {
                for line in lines.by_ref() {
                    *line_no += 1;
                    let line = line.map_err(|e| {
                        EngineError::RecordSource(format!("{}:{}: {}", self.path, line_no, e))
                    })?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record: Record = serde_json::from_str(&line).map_err(|e| {
                        EngineError::RecordSource(format!("{}:{}: {}", self.path, line_no, e))
                    })?;
                    return Ok(Some(record));
                }
                Ok(None)
            }
        }
    }
}

impl RecordSource for JsonlRecordSource {
    fn next_record(&mut self) -> Result<Option<Record>, EngineError> {
        if let Some(limit) = self.limit {
            if self.next_ordinal > limit {
                return Ok(None);
            }
        }

        let Some(mut record) = self.read_next()? else {
            return Ok(None);
        };

        record.ordinal = self.next_ordinal;
        if record.id.trim().is_empty() {
            record.id = record.ordinal.to_string();
        }
        self.next_ordinal += 1;

        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_jsonl_skips_blank_lines_and_numbers_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "papers.jsonl",
            "{\"title\": \"A\", \"abstract\": \"x\"}\n\n{\"Article Title\": \"B\", \"Abstract\": \"\"}\n",
        );

        let mut source = JsonlRecordSource::open(&path, None).unwrap();
        let a = source.next_record().unwrap().unwrap();
        let b = source.next_record().unwrap().unwrap();
        assert!(source.next_record().unwrap().is_none());

        assert_eq!((a.ordinal, a.id.as_str(), a.title.as_str()), (1, "1", "A"));
        assert_eq!((b.ordinal, b.title.as_str()), (2, "B"));
        assert!(b.abstract_is_blank());
    }

    #[test]
    fn test_json_array_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "papers.json",
            r#"[{"id": "w1", "title": "A"}, {"title": "B"}, {"title": "C"}]"#,
        );

        let mut source = JsonlRecordSource::open(&path, Some(2)).unwrap();
        assert_eq!(source.next_record().unwrap().unwrap().id, "w1");
        assert_eq!(source.next_record().unwrap().unwrap().ordinal, 2);
        assert!(source.next_record().unwrap().is_none());
    }

    #[test]
    fn test_bad_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.jsonl", "{\"title\": \"A\"}\nnot json\n");

        let mut source = JsonlRecordSource::open(&path, None).unwrap();
        source.next_record().unwrap();
        let err = source.next_record().unwrap_err();
        assert!(err.to_string().contains("bad.jsonl:2"));
    }
}
