use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info};

use crate::error::LedgerError;

/// Flag id -> alternative answers, as stored on disk.
pub type Answers = BTreeMap<String, BTreeSet<String>>;

/// Persisted table of accepted answers per flag id.
///
/// Saves always rewrite the whole table.
pub trait AnswerLedger {
    fn load_all(&self) -> Result<Answers, LedgerError>;
    fn save_all(&self, answers: &Answers) -> Result<(), LedgerError>;
}

/// Ledger backed by a headerless csv file: `id,answer,answer,...` per row.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl AnswerLedger for CsvLedger {
    fn load_all(&self) -> Result<Answers, LedgerError> {
        if !self.path.exists() {
            info!("Answers file {} not found, creating it", self.path.display());
            self.ensure_parent()?;
            fs::write(&self.path, "")?;
            return Ok(Answers::new());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut answers = Answers::new();
        for result in reader.records() {
            let record = result?;
            let id = match record.get(0) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => continue,
            };
            answers.entry(id).or_default().extend(
                record
                    .iter()
                    .skip(1)
                    .filter(|answer| !answer.is_empty())
                    .map(str::to_string),
            );
        }

        debug!("Loaded {} ledger rows from {}", answers.len(), self.path.display());
        Ok(answers)
    }

    fn save_all(&self, answers: &Answers) -> Result<(), LedgerError> {
        self.ensure_parent()?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        for (id, alternatives) in answers {
            let mut row = Vec::with_capacity(alternatives.len() + 1);
            row.push(id.as_str());
            row.extend(alternatives.iter().map(String::as_str));
            writer.write_record(&row)?;
        }
        writer.flush()?;

        debug!("Wrote {} ledger rows to {}", answers.len(), self.path.display());
        Ok(())
    }
}
