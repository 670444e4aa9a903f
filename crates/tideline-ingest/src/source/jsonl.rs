//! JSONL record source.
//!
//! Reads log records from JSONL input (one JSON record per line). Input is a
//! single file, a directory of `.jsonl`/`.json`/`.ndjson` files processed in
//! name order, or stdin.
//!
//! A record without an `id` takes its position in the input instead (the
//! count of non-blank lines read so far, across every file of the run), so
//! ordering survives inputs that never carried ids.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{RecordSource, SourceStats};
use crate::record::LogRecord;
use crate::{Error, Result};

/// Where to read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonlInput {
    /// A file or a directory of files.
    Path(PathBuf),
    Stdin,
}

impl JsonlInput {
    /// `-` means stdin; anything else is a path.
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            JsonlInput::Stdin
        } else {
            JsonlInput::Path(PathBuf::from(arg))
        }
    }
}

/// Configuration for the JSONL source.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub input: JsonlInput,

    /// Continue processing on errors (log and skip bad lines).
    pub continue_on_error: bool,

    /// Progress reporting interval (records).
    pub progress_interval: usize,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            input: JsonlInput::Stdin,
            continue_on_error: true,
            progress_interval: 100_000,
        }
    }
}

/// One input line: the record plus whether it carried its own id.
#[derive(Deserialize)]
struct JsonlLine {
    #[serde(default)]
    id: Option<u64>,
    #[serde(flatten)]
    record: LogRecord,
}

/// JSONL log record source.
pub struct JsonlSource {
    config: JsonlConfig,
}

impl JsonlSource {
    pub fn new(config: JsonlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JsonlConfig {
        &self.config
    }

    /// Collect files to process based on input path.
    fn collect_files(input: &Path) -> Result<Vec<PathBuf>> {
        if input.is_file() {
            return Ok(vec![input.to_path_buf()]);
        }
        if !input.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Input path does not exist: {}", input.display()),
            )));
        }

        let mut files: Vec<_> = fs::read_dir(input)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext == "jsonl" || ext == "json" || ext == "ndjson")
            })
            .collect();

        // Sort for deterministic processing order
        files.sort();
        Ok(files)
    }

    /// Process one reader. Returns `Ok(false)` if the handler asked to stop.
    fn process_reader<R, F>(
        &self,
        reader: R,
        origin: &str,
        handler: &mut F,
        stats: &mut SourceStats,
    ) -> Result<bool>
    where
        R: BufRead,
        F: FnMut(LogRecord) -> Result<bool>,
    {
        for (line_num, line_result) in reader.lines().enumerate() {
            metrics::counter!("source_lines_total").increment(1);
            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!("{}:{}: I/O error: {}", origin, line_num + 1, e);
                    stats.parse_errors += 1;
                    if self.config.continue_on_error {
                        continue;
                    }
                    return Err(Error::Io(e));
                }
            };

            if line.trim().is_empty() {
                continue;
            }
            stats.total_records += 1;

            let record = match serde_json::from_str::<JsonlLine>(&line) {
                Ok(JsonlLine { id, mut record }) => {
                    record.id = id.unwrap_or(stats.total_records as u64);
                    record
                }
                Err(e) => {
                    tracing::warn!("{}:{}: JSON parse error: {}", origin, line_num + 1, e);
                    metrics::counter!("source_lines_invalid_total").increment(1);
                    stats.parse_errors += 1;
                    if self.config.continue_on_error {
                        continue;
                    }
                    return Err(Error::Json(e));
                }
            };
            stats.valid_records += 1;

            match handler(record) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("Handler signaled stop");
                    stats.stopped = true;
                    return Ok(false);
                }
                Err(e) => {
                    stats.handler_errors += 1;
                    if !self.config.continue_on_error {
                        return Err(e);
                    }
                    tracing::debug!("Handler error: {}", e);
                }
            }

            if stats.total_records.is_multiple_of(self.config.progress_interval) {
                tracing::info!(
                    "Progress: {} records, {} valid, {} parse errors",
                    stats.total_records,
                    stats.valid_records,
                    stats.parse_errors
                );
            }
        }
        Ok(true)
    }
}

impl RecordSource for JsonlSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn process<F>(&mut self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(LogRecord) -> Result<bool>,
    {
        let mut stats = SourceStats::default();

        let path = match &self.config.input {
            JsonlInput::Stdin => {
                tracing::info!("Reading records from stdin");
                let stdin = io::stdin();
                self.process_reader(stdin.lock(), "<stdin>", &mut handler, &mut stats)?;
                return Ok(stats);
            }
            JsonlInput::Path(path) => path.clone(),
        };

        let files = Self::collect_files(&path)?;
        tracing::info!("Found {} JSONL files to process", files.len());

        for (file_idx, file_path) in files.iter().enumerate() {
            tracing::info!(
                "[{}/{}] Processing: {}",
                file_idx + 1,
                files.len(),
                file_path.display()
            );

            let origin = file_path.display().to_string();
            let result = File::open(file_path).map_err(Error::from).and_then(|file| {
                self.process_reader(BufReader::new(file), &origin, &mut handler, &mut stats)
            });

            match result {
                Ok(true) => stats.files_processed += 1,
                Ok(false) => {
                    stats.files_processed += 1;
                    break;
                }
                Err(e) => {
                    tracing::warn!("Error processing {}: {}", file_path.display(), e);
                    if !self.config.continue_on_error {
                        return Err(e);
                    }
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    fn source(input: JsonlInput, continue_on_error: bool) -> JsonlSource {
        JsonlSource::new(JsonlConfig {
            input,
            continue_on_error,
            ..Default::default()
        })
    }

    #[test]
    fn test_single_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "a.jsonl",
            &[
                r#"{"id":1,"message":"one","machine_name":"m1"}"#,
                "",
                r#"{"id":2,"message":"two"}"#,
            ],
        );

        let mut seen = Vec::new();
        let stats = source(JsonlInput::Path(path), true)
            .process(|r| {
                seen.push((r.id, r.machine_name));
                Ok(true)
            })
            .unwrap();

        assert_eq!(seen, vec![(1, Some("m1".to_string())), (2, None)]);
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.valid_records, 2);
        assert_eq!(stats.files_processed, 1);
    }

    #[test]
    fn test_directory_in_name_order_skipping_other_files() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "b.jsonl", &[r#"{"id":2,"message":"b"}"#]);
        write_file(dir.path(), "a.ndjson", &[r#"{"id":1,"message":"a"}"#]);
        write_file(dir.path(), "notes.txt", &["not json"]);

        let mut ids = Vec::new();
        let stats = source(JsonlInput::Path(dir.path().to_path_buf()), true)
            .process(|r| {
                ids.push(r.id);
                Ok(true)
            })
            .unwrap();

        assert_eq!(ids, vec![1, 2]);
        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.parse_errors, 0);
    }

    #[test]
    fn test_bad_lines_are_counted_and_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "a.jsonl",
            &[r#"{"message":"ok"}"#, "{broken", r#"{"no_message":true}"#],
        );

        let mut count = 0;
        let stats = source(JsonlInput::Path(path), true)
            .process(|_| {
                count += 1;
                Ok(true)
            })
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.parse_errors, 2);
    }

    #[test]
    fn test_missing_ids_follow_input_position() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "a.jsonl",
            &[r#"{"message":"a1"}"#, "", r#"{"message":"a2","machine_name":"m1"}"#],
        );
        write_file(
            dir.path(),
            "b.jsonl",
            &[r#"{"message":"b1"}"#, r#"{"id":90,"message":"b2"}"#, r#"{"message":"b3"}"#],
        );

        let mut seen = Vec::new();
        source(JsonlInput::Path(dir.path().to_path_buf()), true)
            .process(|r| {
                seen.push((r.id, r.message));
                Ok(true)
            })
            .unwrap();

        let ids: Vec<_> = seen.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3, 90, 5]);
        assert_eq!(seen[1].1, "a2");
    }

    #[test]
    fn test_explicit_zero_id_is_kept() {
        let src = source(JsonlInput::Stdin, true);
        let mut stats = SourceStats::default();
        let input = Cursor::new("{\"message\":\"x\"}\n{\"id\":0,\"message\":\"y\"}\n");
        let mut ids = Vec::new();
        let mut handler = |r: LogRecord| -> Result<bool> {
            ids.push(r.id);
            Ok(true)
        };
        src.process_reader(input, "test", &mut handler, &mut stats)
            .unwrap();
        assert_eq!(ids, vec![1, 0]);
    }

    #[test]
    fn test_bad_line_fails_without_continue() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "a.jsonl", &["{broken"]);
        let err = source(JsonlInput::Path(path), false)
            .process(|_| Ok(true))
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_handler_stop() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "a.jsonl",
            &[r#"{"message":"1"}"#, r#"{"message":"2"}"#, r#"{"message":"3"}"#],
        );

        let mut count = 0;
        let stats = source(JsonlInput::Path(path), true)
            .process(|_| {
                count += 1;
                Ok(count < 2)
            })
            .unwrap();

        assert_eq!(count, 2);
        assert!(stats.stopped);
    }

    #[test]
    fn test_handler_errors_are_counted() {
        let src = source(JsonlInput::Stdin, true);
        let mut stats = SourceStats::default();
        let input = Cursor::new("{\"message\":\"a\"}\n{\"message\":\"b\"}\n");
        let mut handler = |_: LogRecord| -> Result<bool> { Err(Error::SessionDisposed) };

        let more = src
            .process_reader(input, "test", &mut handler, &mut stats)
            .unwrap();
        assert!(more);
        assert_eq!(stats.handler_errors, 2);
    }

    #[test]
    fn test_missing_path() {
        let err = source(JsonlInput::Path(PathBuf::from("/no/such/input")), true)
            .process(|_| Ok(true))
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_input_parse() {
        assert_eq!(JsonlInput::parse("-"), JsonlInput::Stdin);
        assert_eq!(
            JsonlInput::parse("logs/"),
            JsonlInput::Path(PathBuf::from("logs/"))
        );
    }
}
