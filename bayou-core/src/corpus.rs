//! Parallel corpus reader.
//!
//! Discovers program JSON files with the `ignore` walker, parses them on a
//! rayon pool and merges the per-file shards into one [`ColumnDatabase`].
//!
//! # Accepted layouts
//!
//! - `*.json`: `{"programs": [ {...}, ... ]}` or a top-level array
//! - `*.jsonl` / `*.ndjson`: one program object per line
//!
//! `.json` files are streamed element by element, so a file is never held in
//! memory as a whole. A syntax error ends the file: the records read before
//! it are kept and the file is counted as failed. A malformed record only
//! skips that record.
//!
//! # Record layout
//!
//! ```json
//! {"file": "A.java", "method": "read", "body": "...", "embedding": [0.1, ...],
//!  "apicalls": ["..."], "sequences": [{"calls": ["..."]}], "ast": {...}}
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::de::{DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::database::{ColumnDatabase, ColumnShard, ShardBuilder, DEFAULT_SHARD_CAPACITY};
use crate::error::{CoreError, Result};
use crate::types::{EvalLabels, ProgramRecord};

/// Default embedding dimension of the latent intent space.
pub const DEFAULT_DIMENSION: usize = 256;

/// Default name of the embedding field in corpus objects.
pub const DEFAULT_EMBEDDING_FIELD: &str = "embedding";

const CORPUS_EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

/// Settings for a corpus load.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Directory (or single file) holding the corpus.
    pub location: PathBuf,

    /// Worker threads; 0 uses the rayon default.
    pub num_threads: usize,

    /// Embedding dimension D.
    pub dimension: usize,

    /// Maximum records per shard.
    pub shard_capacity: usize,

    /// First file to read, 1-based, over the sorted file list.
    pub min_files: usize,

    /// Last file to read, inclusive. `None` reads to the end.
    pub max_files: Option<usize>,

    /// Name of the embedding field in each program object.
    pub embedding_field: String,

    /// Files not started before this elapses are skipped.
    pub timeout: Option<Duration>,
}

impl LoaderConfig {
    pub fn new(location: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            location: location.into(),
            num_threads: 0,
            dimension,
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            min_files: 1,
            max_files: None,
            embedding_field: DEFAULT_EMBEDDING_FIELD.to_string(),
            timeout: None,
        }
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_shard_capacity(mut self, capacity: usize) -> Self {
        self.shard_capacity = capacity;
        self
    }

    pub fn with_file_range(mut self, min_files: usize, max_files: Option<usize>) -> Self {
        self.min_files = min_files;
        self.max_files = max_files;
        self
    }

    pub fn with_embedding_field(mut self, field: impl Into<String>) -> Self {
        self.embedding_field = field.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Counters for a completed load.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Corpus files discovered before windowing.
    pub files_seen: usize,

    /// Files parsed to the end.
    pub files_parsed: usize,

    /// Files that ended early on a read or syntax error.
    pub files_failed: usize,

    /// Files never started because the deadline passed.
    pub files_skipped: usize,

    /// Records stored in the database.
    pub records_accepted: usize,

    /// Records rejected (malformed, wrong dimension, non-finite).
    pub records_skipped: usize,

    /// Number of shards in the database.
    pub shards: usize,

    /// Whether the deadline cut the load short.
    pub timed_out: bool,

    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

/// Database plus the report of the load that built it.
#[derive(Debug)]
pub struct LoadedCorpus {
    pub database: ColumnDatabase,
    pub report: LoadReport,
}

/// How a single file ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStatus {
    Parsed,
    Failed,
    NotStarted,
}

/// Output of one worker for one file.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub shards: Vec<ColumnShard>,
    pub accepted: usize,
    pub skipped: usize,
    pub status: FileStatus,
}

impl FileOutcome {
    fn not_started(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            shards: Vec::new(),
            accepted: 0,
            skipped: 0,
            status: FileStatus::NotStarted,
        }
    }
}

/// Reads a corpus directory into a [`ColumnDatabase`].
pub struct CorpusReader {
    config: LoaderConfig,
}

impl CorpusReader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Discover corpus files, sorted, restricted to the configured window.
    ///
    /// Returns the window and the number of files seen before windowing.
    pub fn discover(&self) -> Result<(Vec<PathBuf>, usize)> {
        let root = &self.config.location;
        if !root.exists() {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Path does not exist: {}", root.display()),
            )));
        }

        let mut files: Vec<PathBuf> = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| is_corpus_file(path))
            .collect();
        files.sort();

        let seen = files.len();
        let start = self.config.min_files.saturating_sub(1);
        let end = self.config.max_files.unwrap_or(seen).min(seen);
        let window = if start < end {
            files.drain(start..end).collect()
        } else {
            Vec::new()
        };
        Ok((window, seen))
    }

    /// Load every file in the window and merge the shards in file order.
    pub fn read_all(&self) -> Result<LoadedCorpus> {
        let start = Instant::now();
        let (files, files_seen) = self.discover()?;
        info!(
            "Reading {} of {} corpus files from {}",
            files.len(),
            files_seen,
            self.config.location.display()
        );

        let deadline = self.config.timeout.map(|t| start + t);
        let expired = AtomicBool::new(false);

        let read = |path: &PathBuf| -> FileOutcome {
            if let Some(deadline) = deadline {
                if expired.load(Ordering::Relaxed) || Instant::now() >= deadline {
                    expired.store(true, Ordering::Relaxed);
                    return FileOutcome::not_started(path);
                }
            }
            self.read_file(path)
        };

        let outcomes: Vec<FileOutcome> = if self.config.num_threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.num_threads)
                .build()
            {
                Ok(pool) => pool.install(|| files.par_iter().map(read).collect()),
                Err(e) => {
                    warn!("Failed to build reader pool, using global pool: {}", e);
                    files.par_iter().map(read).collect()
                }
            }
        } else {
            files.par_iter().map(read).collect()
        };

        let mut database = ColumnDatabase::new(self.config.dimension);
        let mut report = LoadReport {
            files_seen,
            ..LoadReport::default()
        };
        for outcome in outcomes {
            match outcome.status {
                FileStatus::Parsed => report.files_parsed += 1,
                FileStatus::Failed => report.files_failed += 1,
                FileStatus::NotStarted => report.files_skipped += 1,
            }
            report.records_accepted += outcome.accepted;
            report.records_skipped += outcome.skipped;
            for shard in outcome.shards {
                database.push_shard(shard)?;
            }
        }
        report.shards = database.num_shards();
        report.timed_out = report.files_skipped > 0;
        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if report.timed_out {
            warn!(
                "Corpus load deadline passed, {} files were not read",
                report.files_skipped
            );
        }
        info!(
            "Loaded {} records in {} shards ({} skipped, {} files failed) in {:.1}ms",
            report.records_accepted,
            report.shards,
            report.records_skipped,
            report.files_failed,
            report.duration_ms
        );

        if database.is_empty() && !report.timed_out {
            return Err(CoreError::EmptyCorpus {
                location: self.config.location.display().to_string(),
            });
        }
        Ok(LoadedCorpus { database, report })
    }

    /// Parse one file into shards. Never fails: problems are counted.
    pub fn read_file(&self, path: &Path) -> FileOutcome {
        let mut sink = ShardSink::new(path, &self.config);

        let result = File::open(path).map_err(CoreError::from).and_then(|file| {
            let reader = BufReader::new(file);
            if is_line_delimited(path) {
                read_lines(reader, &mut sink)
            } else {
                let mut de = serde_json::Deserializer::from_reader(reader);
                ProgramsSeed { sink: &mut sink }.deserialize(&mut de)?;
                de.end()?;
                Ok(())
            }
        });

        let status = match result {
            Ok(()) => FileStatus::Parsed,
            Err(e) => {
                warn!("Stopped reading {}: {}", path.display(), e);
                FileStatus::Failed
            }
        };
        let outcome = sink.finish(status);
        debug!(
            "{}: {} records accepted, {} skipped",
            path.display(),
            outcome.accepted,
            outcome.skipped
        );
        outcome
    }
}

fn is_corpus_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| CORPUS_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_line_delimited(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl") || e.eq_ignore_ascii_case("ndjson"))
}

fn read_lines<R: BufRead>(reader: R, sink: &mut ShardSink<'_>) -> Result<()> {
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(value) => sink.accept(value),
            Err(e) => {
                debug!("{}: skipping malformed line: {}", sink.file, e);
                sink.skipped += 1;
            }
        }
    }
    Ok(())
}

/// Collects records of one file into shards.
struct ShardSink<'a> {
    file: String,
    config: &'a LoaderConfig,
    builder: ShardBuilder,
    shards: Vec<ColumnShard>,
    accepted: usize,
    skipped: usize,
}

impl<'a> ShardSink<'a> {
    fn new(path: &Path, config: &'a LoaderConfig) -> Self {
        Self {
            file: path.display().to_string(),
            config,
            builder: ShardBuilder::new(config.dimension, config.shard_capacity),
            shards: Vec::new(),
            accepted: 0,
            skipped: 0,
        }
    }

    fn accept(&mut self, value: Value) {
        let parsed = parse_program(value, &self.config.embedding_field).map_err(|message| {
            CoreError::CorpusParse {
                file: self.file.clone(),
                message,
            }
        });
        let (record, embedding) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("{}", e);
                self.skipped += 1;
                return;
            }
        };

        if self.builder.is_full() {
            self.flush();
        }
        match self.builder.push_shared(Arc::new(record), &embedding) {
            Ok(()) => self.accepted += 1,
            // counted by the builder
            Err(e) => debug!("{}: skipping record: {}", self.file, e),
        }
    }

    fn flush(&mut self) {
        let fresh = ShardBuilder::new(self.config.dimension, self.config.shard_capacity);
        let full = std::mem::replace(&mut self.builder, fresh);
        self.skipped += full.skipped();
        if !full.is_empty() {
            self.shards.push(full.finish());
        }
    }

    fn finish(mut self, status: FileStatus) -> FileOutcome {
        self.flush();
        FileOutcome {
            path: PathBuf::from(self.file),
            shards: self.shards,
            accepted: self.accepted,
            skipped: self.skipped,
            status,
        }
    }
}

/// Program object fields other than the embedding.
#[derive(Deserialize)]
struct RawProgram {
    #[serde(alias = "fileName")]
    file: String,
    #[serde(alias = "methodName")]
    method: String,
    #[serde(default)]
    body: String,
    #[serde(default, alias = "testapicalls")]
    apicalls: Option<Vec<String>>,
    #[serde(default)]
    sequences: Option<Value>,
    #[serde(default)]
    ast: Option<Value>,
}

fn parse_program(
    mut value: Value,
    embedding_field: &str,
) -> std::result::Result<(ProgramRecord, Vec<f32>), String> {
    let object = value
        .as_object_mut()
        .ok_or_else(|| "program entry is not an object".to_string())?;
    let raw_embedding = object
        .remove(embedding_field)
        .ok_or_else(|| format!("missing embedding field '{}'", embedding_field))?;
    let embedding = parse_embedding(raw_embedding)?;

    let raw: RawProgram = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let mut api_calls = raw.apicalls.unwrap_or_default();
    api_calls.sort();
    api_calls.dedup();

    let labels = EvalLabels {
        api_calls,
        sequence: raw.sequences.map(longest_sequence).unwrap_or_default(),
        ast: raw.ast,
    };
    let record = ProgramRecord::new(raw.file, raw.method, raw.body).with_labels(labels);
    Ok((record, embedding))
}

/// Accepts a flat vector or a single-row matrix.
fn parse_embedding(value: Value) -> std::result::Result<Vec<f32>, String> {
    let value = match value {
        Value::Array(mut rows) if rows.len() == 1 && rows[0].is_array() => rows.remove(0),
        other => other,
    };
    serde_json::from_value(value).map_err(|e| format!("invalid embedding: {}", e))
}

/// Normalize `sequences` to a single call list.
///
/// Either a flat list of calls, or a list of `{"calls": [...]}` objects of
/// which the longest is kept (first one on ties).
pub fn longest_sequence(value: Value) -> Vec<String> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    if items.iter().all(|v| v.is_string()) {
        return items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }

    let mut best: Vec<String> = Vec::new();
    for item in items {
        let calls: Vec<String> = item
            .get("calls")
            .and_then(|c| c.as_array())
            .map(|c| c.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if calls.len() > best.len() {
            best = calls;
        }
    }
    best
}

/// Top level of a `.json` corpus file: `{"programs": [...]}` or `[...]`.
struct ProgramsSeed<'s, 'a> {
    sink: &'s mut ShardSink<'a>,
}

impl<'de> DeserializeSeed<'de> for ProgramsSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ProgramsSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of programs or an object with a \"programs\" array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(value) = seq.next_element::<Value>()? {
            self.sink.accept(value);
        }
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            if key == "programs" {
                map.next_value_seed(ProgramsSeed {
                    sink: &mut *self.sink,
                })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_wrapped_programs() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.json",
            r#"{"programs": [
                {"file": "A.java", "method": "read", "body": "x", "embedding": [1.0, 0.0],
                 "apicalls": ["b", "a", "b"], "sequences": [{"calls": ["a"]}, {"calls": ["a", "b"]}]},
                {"file": "B.java", "method": "write", "embedding": [0.0, 1.0]}
            ]}"#,
        );

        let reader = CorpusReader::new(LoaderConfig::new(dir.path(), 2));
        let outcome = reader.read_file(&path);
        assert_eq!(outcome.status, FileStatus::Parsed);
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.skipped, 0);

        let shard = &outcome.shards[0];
        let first = shard.record(0).unwrap();
        assert_eq!(first.labels.api_calls, vec!["a", "b"]);
        assert_eq!(first.labels.sequence, vec!["a", "b"]);
        assert_eq!(shard.embedding(1), &[0.0, 1.0]);
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.json",
            r#"[
                {"file": "A.java", "method": "ok", "embedding": [1.0, 0.0]},
                {"file": "A.java", "embedding": [1.0, 0.0]},
                {"file": "A.java", "method": "long", "embedding": [1.0, 0.0, 0.0]},
                {"file": "A.java", "method": "text", "embedding": "nope"}
            ]"#,
        );

        let outcome = CorpusReader::new(LoaderConfig::new(dir.path(), 2)).read_file(&path);
        assert_eq!(outcome.status, FileStatus::Parsed);
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.skipped, 3);
    }

    #[test]
    fn test_truncated_file_keeps_prefix() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.json",
            r#"{"programs": [{"file": "A", "method": "m", "embedding": [1.0]}, {"file": "#,
        );

        let outcome = CorpusReader::new(LoaderConfig::new(dir.path(), 1)).read_file(&path);
        assert_eq!(outcome.status, FileStatus::Failed);
        assert_eq!(outcome.accepted, 1);
    }

    #[test]
    fn test_jsonl_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.jsonl",
            "{\"file\": \"A\", \"method\": \"m\", \"embedding\": [1.0]}\n\
             not json\n\
             \n\
             {\"file\": \"B\", \"method\": \"n\", \"embedding\": [2.0]}\n",
        );

        let outcome = CorpusReader::new(LoaderConfig::new(dir.path(), 1)).read_file(&path);
        assert_eq!(outcome.status, FileStatus::Parsed);
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_custom_embedding_field_and_nested_vector() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.json",
            r#"[{"fileName": "A", "methodName": "m", "b2": [[0.5, 0.5]]}]"#,
        );

        let config = LoaderConfig::new(dir.path(), 2).with_embedding_field("b2");
        let outcome = CorpusReader::new(config).read_file(&path);
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.shards[0].embedding(0), &[0.5, 0.5]);
        assert_eq!(outcome.shards[0].record(0).unwrap().file_name, "A");
    }

    #[test]
    fn test_shards_split_at_capacity() {
        let dir = TempDir::new().unwrap();
        let programs: Vec<String> = (0..5)
            .map(|i| format!(r#"{{"file": "F", "method": "m{}", "embedding": [{}.0]}}"#, i, i))
            .collect();
        let path = write(&dir, "a.json", &format!("[{}]", programs.join(",")));

        let config = LoaderConfig::new(dir.path(), 1).with_shard_capacity(2);
        let outcome = CorpusReader::new(config).read_file(&path);
        let sizes: Vec<usize> = outcome.shards.iter().map(|s| s.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_discover_window() {
        let dir = TempDir::new().unwrap();
        for name in ["c.json", "a.json", "b.jsonl", "notes.txt"] {
            write(&dir, name, "[]");
        }

        let config = LoaderConfig::new(dir.path(), 1).with_file_range(2, Some(3));
        let (files, seen) = CorpusReader::new(config).discover().unwrap();
        assert_eq!(seen, 3);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b.jsonl", "c.json"]);
    }

    #[test]
    fn test_empty_corpus_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.json", r#"{"programs": []}"#);

        let err = CorpusReader::new(LoaderConfig::new(dir.path(), 2))
            .read_all()
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyCorpus { .. }));
    }

    #[test]
    fn test_expired_deadline_skips_unstarted_files() {
        let dir = TempDir::new().unwrap();
        for name in ["a.json", "b.json", "c.json"] {
            write(
                &dir,
                name,
                r#"{"programs": [{"file": "A.java", "method": "a", "embedding": [1.0, 0.0]}]}"#,
            );
        }

        let config = LoaderConfig::new(dir.path(), 2)
            .with_threads(2)
            .with_timeout(Duration::ZERO);
        let corpus = CorpusReader::new(config).read_all().unwrap();
        assert!(corpus.report.timed_out);
        assert_eq!(corpus.report.files_seen, 3);
        assert_eq!(corpus.report.files_skipped, 3);
        assert_eq!(corpus.report.files_parsed, 0);
        assert_eq!(corpus.report.records_accepted, 0);
        assert!(corpus.database.is_empty());

        let config = LoaderConfig::new(dir.path(), 2).with_timeout(Duration::from_secs(600));
        let corpus = CorpusReader::new(config).read_all().unwrap();
        assert!(!corpus.report.timed_out);
        assert_eq!(corpus.report.files_skipped, 0);
        assert_eq!(corpus.report.records_accepted, 3);
    }

    #[test]
    fn test_missing_location() {
        let config = LoaderConfig::new("/nonexistent/corpus/path", 2);
        assert!(matches!(
            CorpusReader::new(config).read_all(),
            Err(CoreError::Io(_))
        ));
    }

    #[test]
    fn test_longest_sequence_flat_list() {
        let value = serde_json::json!(["a", "b"]);
        assert_eq!(longest_sequence(value), vec!["a", "b"]);
        assert!(longest_sequence(serde_json::json!(null)).is_empty());
    }
}
