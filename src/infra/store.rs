// src/infra/store.rs — Filesystem artifact store for experiment output
//
// Layout under the store root:
//   runs/<run_id>/run.json        frozen experiment record
//   runs/<run_id>/results.jsonl   per-sample results, appended incrementally
//   ranking.json                  consolidated ranking from the last sweep
//   best/<config_id>.json         exported winning configuration
//   leaderboard.json              derived summary over all runs

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::infra::errors::LogEvalError;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id)
    }

    /// Write a value as pretty-printed JSON at a path relative to the root,
    /// creating parent directories as needed.
    pub fn write_json<T: Serialize>(&self, rel: &str, value: &T) -> Result<(), LogEvalError> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    pub fn read_json<T: DeserializeOwned>(&self, rel: &str) -> Result<T, LogEvalError> {
        let data = std::fs::read_to_string(self.root.join(rel))?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Open an append-mode line writer for a run's results file.
    pub fn results_writer(
        &self,
        run_id: &str,
        flush_every: usize,
    ) -> Result<ResultsWriter, LogEvalError> {
        let dir = self.run_dir(run_id);
        std::fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("results.jsonl"))?;
        Ok(ResultsWriter {
            writer: BufWriter::new(file),
            flush_every: flush_every.max(1),
            pending: 0,
        })
    }

    /// Run ids under `runs/`, sorted for deterministic iteration.
    pub fn list_run_ids(&self) -> Result<Vec<String>, LogEvalError> {
        let runs = self.root.join("runs");
        if !runs.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(runs)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Single-writer append handle for line-delimited JSON results.
///
/// Each appended line is a complete JSON document, so a crash mid-run leaves
/// a readable prefix of the results rather than a corrupt file.
pub struct ResultsWriter {
    writer: BufWriter<File>,
    flush_every: usize,
    pending: usize,
}

impl ResultsWriter {
    pub fn append<T: Serialize>(&mut self, value: &T) -> Result<(), LogEvalError> {
        let line = serde_json::to_string(value)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.pending += 1;
        if self.pending >= self.flush_every {
            self.writer.flush()?;
            self.pending = 0;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), LogEvalError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read every line of a results file back as typed records.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LogEvalError> {
    let data = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in data.lines() {
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Record {
        id: String,
        value: f64,
    }

    fn record(id: &str, value: f64) -> Record {
        Record {
            id: id.into(),
            value,
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.write_json("nested/dir/record.json", &record("a", 0.5)).unwrap();
        let loaded: Record = store.read_json("nested/dir/record.json").unwrap();
        assert_eq!(loaded, record("a", 0.5));
    }

    #[test]
    fn test_read_missing_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let result: Result<Record, _> = store.read_json("missing.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_results_writer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let mut writer = store.results_writer("run-1", 1).unwrap();
        writer.append(&record("a", 1.0)).unwrap();
        writer.append(&record("b", 2.0)).unwrap();
        writer.finish().unwrap();

        let path = store.run_dir("run-1").join("results.jsonl");
        let records: Vec<Record> = read_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a");
        assert_eq!(records[1].id, "b");
    }

    #[test]
    fn test_results_writer_reopens_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let mut w1 = store.results_writer("run-2", 1).unwrap();
        w1.append(&record("a", 1.0)).unwrap();
        w1.finish().unwrap();

        let mut w2 = store.results_writer("run-2", 1).unwrap();
        w2.append(&record("b", 2.0)).unwrap();
        w2.finish().unwrap();

        let records: Vec<Record> =
            read_jsonl(&store.run_dir("run-2").join("results.jsonl")).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_list_run_ids_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        for id in ["20260102-b", "20260101-a", "20260103-c"] {
            std::fs::create_dir_all(store.run_dir(id)).unwrap();
        }

        let ids = store.list_run_ids().unwrap();
        assert_eq!(ids, vec!["20260101-a", "20260102-b", "20260103-c"]);
    }

    #[test]
    fn test_list_run_ids_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.list_run_ids().unwrap().is_empty());
    }
}
