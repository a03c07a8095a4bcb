//! Flat-file tabular interchange.
//!
//! RULE: Only the store touches the filesystem.
//! Pipeline stages take and return in-memory tables; the runner
//! hands them to the store for reading and writing.

mod inputs;

pub use inputs::{HazardRatioRecord, HouseholdRecord, MacroRecord};

use crate::error::{ModelError, ModelResult};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

pub const MACRO_FILE: &str = "macro.csv";
pub const HOUSEHOLDS_FILE: &str = "households.csv";
pub const HAZARD_RATIOS_FILE: &str = "hazard_ratios.csv";

/// Raw pipeline inputs, exactly as read from disk.
#[derive(Debug, Clone, Default)]
pub struct InputTables {
    pub macro_rows: Vec<MacroRecord>,
    pub households: Vec<HouseholdRecord>,
    pub hazard_ratios: Vec<HazardRatioRecord>,
}

/// A directory of CSV tables.
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the three input files.
    pub fn read_inputs(&self) -> ModelResult<InputTables> {
        let inputs = InputTables {
            macro_rows: self.read_table(MACRO_FILE)?,
            households: self.read_table(HOUSEHOLDS_FILE)?,
            hazard_ratios: self.read_table(HAZARD_RATIOS_FILE)?,
        };
        log::info!(
            "read {} regions, {} households, {} hazard rows from {}",
            inputs.macro_rows.len(),
            inputs.households.len(),
            inputs.hazard_ratios.len(),
            self.dir.display()
        );
        Ok(inputs)
    }

    pub fn read_table<T: DeserializeOwned>(&self, name: &'static str) -> ModelResult<Vec<T>> {
        let mut rdr = csv::Reader::from_path(self.dir.join(name))?;
        let rows = rdr.deserialize().collect::<Result<Vec<T>, _>>()?;
        if rows.is_empty() {
            return Err(ModelError::EmptyTable(name));
        }
        Ok(rows)
    }

    /// Write `rows` to `name`, creating the directory if needed.
    /// An empty table still gets a file so downstream readers see it was run.
    pub fn write_table<T: Serialize>(&self, name: &str, rows: &[T]) -> ModelResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut wtr = csv::Writer::from_path(self.dir.join(name))?;
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        log::debug!("wrote {} rows to {name}", rows.len());
        Ok(())
    }

    pub fn write_text(&self, name: &str, content: &str) -> ModelResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.dir.join(name), content)?;
        Ok(())
    }
}
