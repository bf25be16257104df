//! Line coverage collected by workers.
//!
//! A child process appends one JSON record per test case to its worker's
//! coverage file (JSON lines). At end-of-stream the worker compacts the file
//! into a single record, and the aggregator merges every worker's file once
//! all workers are done.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors reading or writing a coverage file.
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error("coverage file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("coverage file {}, line {line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Coverage of one source file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCoverage {
    /// Lines that could have run.
    pub executable: BTreeSet<u32>,
    /// Lines that did run.
    pub executed: BTreeSet<u32>,
}

impl FileCoverage {
    fn merge(&mut self, other: FileCoverage) {
        self.executable.extend(other.executable);
        self.executed.extend(other.executed);
    }

    /// Executed lines count as executable even if the record forgot them.
    fn executable_count(&self) -> usize {
        self.executable.union(&self.executed).count()
    }
}

/// Coverage keyed by source file name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageData {
    files: BTreeMap<String, FileCoverage>,
}

impl CoverageData {
    pub fn new() -> Self {
        CoverageData::default()
    }

    /// Record coverage for `file`.
    pub fn add_file(&mut self, file: impl Into<String>, coverage: FileCoverage) {
        self.files.entry(file.into()).or_default().merge(coverage);
    }

    /// Union `other` into `self`.
    pub fn merge(&mut self, other: CoverageData) {
        for (file, coverage) in other.files {
            self.add_file(file, coverage);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over covered files.
    pub fn files(&self) -> impl Iterator<Item = (&str, &FileCoverage)> + '_ {
        self.files.iter().map(|(name, cov)| (name.as_str(), cov))
    }

    /// Number of executed lines across all files.
    pub fn covered_lines(&self) -> usize {
        self.files.values().map(|f| f.executed.len()).sum()
    }

    /// Number of executable lines across all files.
    pub fn total_lines(&self) -> usize {
        self.files.values().map(FileCoverage::executable_count).sum()
    }

    /// Coverage percentage (0-100). Nothing to cover counts as complete.
    pub fn percentage(&self) -> f64 {
        let total = self.total_lines();
        if total == 0 {
            return 100.0;
        }
        // Clamp to u32 for a lossless f64 conversion; the ratio is preserved.
        let covered = u32::try_from(self.covered_lines()).unwrap_or(u32::MAX);
        let total = u32::try_from(total).unwrap_or(u32::MAX);
        (f64::from(covered) / f64::from(total)) * 100.0
    }

    /// Read a JSON-lines coverage file, merging every record.
    ///
    /// A missing file is empty coverage: the worker never ran a test that
    /// reported any.
    pub fn load(path: &Path) -> Result<Self, CoverageError> {
        let io_err = |source| CoverageError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CoverageData::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut data = CoverageData::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let record: CoverageData =
                serde_json::from_str(&line).map_err(|source| CoverageError::Parse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    source,
                })?;
            data.merge(record);
        }
        Ok(data)
    }

    /// Replace `path` with a single record holding this data.
    pub fn store(&self, path: &Path) -> Result<(), CoverageError> {
        let io_err = |source| CoverageError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut line = serde_json::to_vec(self).map_err(|source| CoverageError::Parse {
            path: path.to_path_buf(),
            line: 1,
            source,
        })?;
        line.push(b'\n');
        let mut file = fs::File::create(path).map_err(io_err)?;
        file.write_all(&line).map_err(io_err)
    }
}
