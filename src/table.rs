//! Replicate measurements
//!
//! ```text
//!  instrument export (.csv)
//!        │  normalise headers, map to internal names, keep target peak
//!        ▼
//!  ┌───────────────┐
//!  │ ReplicateTable │  one row per injection, exclusion flags
//!  └───────────────┘
//! ```
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use itertools::Itertools;
use ndarray::Array1;

use crate::config::{SystemConfig, PEAK, ROW, SAMPLE_NAME};
use crate::{Error, Result};

/// A single injection as reported by the instrument
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicateRow {
    /// Sample name as typed into the sequence, surrounding whitespace removed
    pub sample_name: String,
    /// Value of the target column
    pub value: f64,
    /// Instrument row identifier, when the export carries one
    pub row: Option<i64>,
    /// Any further numeric columns, keyed by internal name
    pub auxiliary: BTreeMap<String, f64>,
    excluded: bool,
}

impl ReplicateRow {
    pub fn new(sample_name: impl Into<String>, value: f64) -> Self {
        Self {
            sample_name: sample_name.into().trim().to_owned(),
            value,
            row: None,
            auxiliary: BTreeMap::new(),
            excluded: false,
        }
    }

    #[must_use]
    pub fn with_row(mut self, row: i64) -> Self {
        self.row = Some(row);
        self
    }

    #[must_use]
    pub fn with_auxiliary(mut self, column: impl Into<String>, value: f64) -> Self {
        self.auxiliary.insert(column.into(), value);
        self
    }

    pub const fn is_excluded(&self) -> bool {
        self.excluded
    }
}

/// The replicate table of a single run
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicateTable {
    target_column: String,
    rows: Vec<ReplicateRow>,
}

impl ReplicateTable {
    pub fn new(target_column: impl Into<String>, rows: Vec<ReplicateRow>) -> Self {
        Self {
            target_column: target_column.into(),
            rows,
        }
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    pub fn rows(&self) -> &[ReplicateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row identifier column is present when every row carries an identifier
    pub fn has_row_ids(&self) -> bool {
        self.rows.iter().all(|row| row.row.is_some())
    }

    /// Rows which have not been excluded
    pub fn included(&self) -> impl Iterator<Item = &ReplicateRow> + '_ {
        self.rows.iter().filter(|row| !row.excluded)
    }

    /// Target values of the included rows, in table order
    pub fn included_values(&self) -> Array1<f64> {
        self.included().map(|row| row.value).collect()
    }

    /// Flag every row whose identifier is in `ids` as excluded
    ///
    /// Excluding an already excluded row is a no-op. Returns the number of newly excluded rows.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the table has no row identifier column.
    pub fn exclude_rows(&mut self, ids: &[i64]) -> Result<usize> {
        if !self.has_row_ids() {
            return Err(Error::Configuration(
                "data does not contain a row identifier column for exclusion".into(),
            ));
        }
        let mut newly_excluded = 0;
        for row in &mut self.rows {
            if !row.excluded && row.row.map_or(false, |id| ids.contains(&id)) {
                row.excluded = true;
                newly_excluded += 1;
            }
        }
        Ok(newly_excluded)
    }

    /// Read an instrument export from disk
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or does not have the columns required by
    /// `config`.
    pub fn from_csv(path: &Path, config: &SystemConfig) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("reading replicates from {path:?}");
        Self::from_reader(file, config)
    }

    /// Read an instrument export
    ///
    /// Headers have runs of whitespace collapsed before they are mapped to internal names, as the
    /// instrument software pads some of them (`"Ampl  28"`). Headers without a mapping keep their
    /// normalised name. Rows with an empty or non-finite target cell are skipped, as are non-finite
    /// auxiliary cells.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a required column is missing, and
    /// [`Error::Validation`] if a required cell cannot be parsed.
    pub fn from_reader<R: io::Read>(reader: R, config: &SystemConfig) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let mapping = config.mapping();
        let columns = rdr
            .headers()?
            .iter()
            .map(|header| {
                let header = header.split_whitespace().join(" ");
                mapping.get(&header).cloned().unwrap_or(header)
            })
            .collect::<Vec<_>>();

        let position = |name: &str| columns.iter().position(|column| column == name);
        let mut required = vec![SAMPLE_NAME, ROW, config.target_column.as_str()];
        if config.target_peak.is_some() {
            required.push(PEAK);
        }
        let missing = required
            .iter()
            .copied()
            .filter(|&name| position(name).is_none())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "input is missing required columns {missing:?}, columns found: {columns:?}"
            )));
        }
        // All present, checked above
        let sample_idx = position(SAMPLE_NAME).unwrap_or_default();
        let row_idx = position(ROW).unwrap_or_default();
        let target_idx = position(config.target_column.as_str()).unwrap_or_default();
        let peak_idx = position(PEAK);

        let mut rows = vec![];
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let cell = |idx: usize| record.get(idx).map_or("", str::trim);

            if let (Some(target_peak), Some(peak_idx)) = (config.target_peak, peak_idx) {
                if parse_integer(cell(peak_idx)) != Some(target_peak) {
                    continue;
                }
            }

            if cell(target_idx).is_empty() {
                log::warn!("skipping line {} without a {} value", line + 2, config.target_column);
                continue;
            }
            let value = cell(target_idx).parse::<f64>().map_err(|e| {
                Error::Validation(format!(
                    "line {}: {} value {:?} is not a number: {e}",
                    line + 2,
                    config.target_column,
                    cell(target_idx)
                ))
            })?;
            if !value.is_finite() {
                log::warn!(
                    "skipping line {} with non-finite {} value {value}",
                    line + 2,
                    config.target_column
                );
                continue;
            }
            let row = parse_integer(cell(row_idx)).ok_or_else(|| {
                Error::Validation(format!(
                    "line {}: row identifier {:?} is not an integer",
                    line + 2,
                    cell(row_idx)
                ))
            })?;

            let mut replicate = ReplicateRow::new(cell(sample_idx), value).with_row(row);
            for (idx, column) in columns.iter().enumerate() {
                if idx == sample_idx || idx == row_idx || idx == target_idx {
                    continue;
                }
                if let Ok(aux) = cell(idx).parse::<f64>() {
                    if !aux.is_finite() {
                        continue;
                    }
                    replicate.auxiliary.insert(column.clone(), aux);
                }
            }
            rows.push(replicate);
        }

        log::debug!("read {} replicates for system {}", rows.len(), config.name);
        Ok(Self::new(config.target_column.clone(), rows))
    }
}

/// Integers are sometimes exported with a trailing `.0`
fn parse_integer(cell: &str) -> Option<i64> {
    cell.parse::<i64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && v.abs() < 9.0e15)
            .map(|v| v as i64)
    })
}
