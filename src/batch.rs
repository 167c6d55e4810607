//! The batch pipeline
//!
//! A [`Batch`] owns the replicate table of one instrument run and moves through
//!
//! ```text
//! Loaded ──set_anchors──▶ AnchorsConfigured ──process──▶ Processed ──report──▶ Reported
//!    ▲                           ▲                                                  │
//!    └───────────────────────────┴──────────── exclude_rows / set_anchors ──────────┘
//! ```
//!
//! Processing always starts again from the replicate table, so the only state carried between
//! calls is the table itself and the registered standards.
use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Array1;
use serde::Serialize;

use crate::config::{StandardOverlap, SystemConfig};
use crate::kragten::{propagate_sample, Propagation};
use crate::standards::{ReferenceMaterial, Registry};
use crate::stats::{aggregate_by, SampleAggregate};
use crate::strategy::CalibrationStrategy;
use crate::table::ReplicateTable;
use crate::{Error, Result};

/// Where a batch is in its pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Loaded,
    AnchorsConfigured,
    Processed,
    Reported,
}

/// One line of the client report
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ReportRow {
    pub corrected_value: f64,
    pub combined_uncertainty: f64,
    pub count: usize,
}

/// Trueness check of a control standard
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QaqcRow {
    pub true_value: f64,
    pub corrected_value: f64,
    pub bias: f64,
    /// Whether the bias is smaller than twice the combined uncertainty
    pub within_tolerance: bool,
}

/// The calibrated result for one sample
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalculationResult {
    pub identifier: String,
    pub raw_mean: f64,
    pub corrected_value: f64,
    pub combined_uncertainty: f64,
    /// The strategy and anchors the value was calibrated with
    pub calibration: String,
}

/// A replicate with its row-level correction
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrectedReplicate {
    pub row: Option<i64>,
    pub sample_name: String,
    pub raw_value: f64,
    pub corrected_value: f64,
}

#[derive(Debug)]
struct SampleSummary {
    raw: SampleAggregate,
    propagation: Propagation,
}

#[derive(Debug)]
struct Processed {
    strategy: Box<dyn CalibrationStrategy>,
    corrected_replicates: Array1<f64>,
    summary: BTreeMap<String, SampleSummary>,
}

/// A single instrument run
#[derive(Debug)]
pub struct Batch {
    config: SystemConfig,
    registry: Registry,
    table: ReplicateTable,
    anchors: BTreeMap<String, ReferenceMaterial>,
    controls: BTreeMap<String, ReferenceMaterial>,
    state: BatchState,
    processed: Option<Processed>,
}

impl Batch {
    /// Wrap a replicate table
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the table's target column differs from the configured
    /// one, or [`Error::Validation`] if a configured custom standard is invalid or a replicate
    /// value is not finite.
    pub fn new(table: ReplicateTable, config: SystemConfig) -> Result<Self> {
        config.validate()?;
        if let Some(bad) = table.rows().iter().find(|row| !row.value.is_finite()) {
            return Err(Error::Validation(format!(
                "replicate of {} (row {:?}) has non-finite {} value {}",
                bad.sample_name,
                bad.row,
                table.target_column(),
                bad.value
            )));
        }
        if table.target_column() != config.target_column {
            return Err(Error::Configuration(format!(
                "table holds {} but system {} calibrates {}",
                table.target_column(),
                config.name,
                config.target_column
            )));
        }
        let registry = config.registry()?;
        Ok(Self {
            config,
            registry,
            table,
            anchors: BTreeMap::new(),
            controls: BTreeMap::new(),
            state: BatchState::Loaded,
            processed: None,
        })
    }

    /// Read an instrument export and wrap it
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is inconsistent with `config`.
    pub fn from_csv(path: &Path, config: SystemConfig) -> Result<Self> {
        let table = ReplicateTable::from_csv(path, &config)?;
        Self::new(table, config)
    }

    pub const fn state(&self) -> BatchState {
        self.state
    }

    pub const fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub const fn table(&self) -> &ReplicateTable {
        &self.table
    }

    pub const fn anchors(&self) -> &BTreeMap<String, ReferenceMaterial> {
        &self.anchors
    }

    pub const fn controls(&self) -> &BTreeMap<String, ReferenceMaterial> {
        &self.controls
    }

    /// Number of injections recorded for each sample name, excluded ones included
    pub fn data_view(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in self.table.rows() {
            *counts.entry(row.sample_name.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Drop the processed results after the inputs changed
    fn invalidate(&mut self) {
        self.processed = None;
        self.state = if self.anchors.is_empty() {
            BatchState::Loaded
        } else {
            BatchState::AnchorsConfigured
        };
    }

    /// Exclude rows by their instrument row identifier
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the data has no row identifier column.
    pub fn exclude_rows(&mut self, ids: &[i64]) -> Result<()> {
        let excluded = self.table.exclude_rows(ids)?;
        log::debug!("excluded {excluded} new rows from {} requested", ids.len());
        self.invalidate();
        Ok(())
    }

    fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<BTreeMap<String, ReferenceMaterial>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.registry
                    .lookup(name)
                    .map(|standard| (standard.name().to_owned(), standard))
                    .ok_or_else(|| Error::UnresolvedStandard(name.to_owned()))
            })
            .collect()
    }

    fn check_overlap(
        &self,
        anchors: &BTreeMap<String, ReferenceMaterial>,
        controls: &BTreeMap<String, ReferenceMaterial>,
    ) -> Result<()> {
        if self.config.standard_overlap == StandardOverlap::Allow {
            return Ok(());
        }
        match anchors.keys().find(|name| controls.contains_key(*name)) {
            Some(name) => Err(Error::Configuration(format!(
                "{name} cannot be both an anchor and a control standard"
            ))),
            None => Ok(()),
        }
    }

    /// Register the standards the calibration is fitted to
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedStandard`] naming the first unknown standard, or
    /// [`Error::Configuration`] if `names` is empty or overlap with the controls is forbidden.
    pub fn set_anchors<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        if names.is_empty() {
            return Err(Error::Configuration(
                "at least one anchor standard is required".into(),
            ));
        }
        let anchors = self.resolve(names)?;
        self.check_overlap(&anchors, &self.controls)?;
        log::info!(
            "anchors set to {:?}",
            anchors.keys().collect::<Vec<_>>()
        );
        self.anchors = anchors;
        self.processed = None;
        self.state = BatchState::AnchorsConfigured;
        Ok(())
    }

    /// Register the standards used to check trueness
    ///
    /// Controls never take part in the fit, so processed results stay valid.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedStandard`] naming the first unknown standard, or
    /// [`Error::Configuration`] if overlap with the anchors is forbidden.
    pub fn set_controls<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let controls = self.resolve(names)?;
        self.check_overlap(&self.anchors, &controls)?;
        self.controls = controls;
        Ok(())
    }

    fn canonical_anchor(&self, sample_name: &str) -> Option<&str> {
        self.anchors
            .values()
            .find(|standard| standard.matches(sample_name))
            .map(ReferenceMaterial::name)
    }

    /// Fit `strategy` to the anchors and calibrate every sample
    ///
    /// # Errors
    /// Returns [`Error::State`] if no anchors were registered, and [`Error::Fit`] if no rows
    /// match the anchors or the strategy cannot be fitted.
    pub fn process<S: CalibrationStrategy + 'static>(&mut self, strategy: S) -> Result<()> {
        self.process_boxed(Box::new(strategy))
    }

    /// As [`Self::process`], for a strategy chosen at runtime
    ///
    /// # Errors
    /// See [`Self::process`].
    pub fn process_boxed(&mut self, mut strategy: Box<dyn CalibrationStrategy>) -> Result<()> {
        if self.state == BatchState::Loaded {
            return Err(Error::State(
                "anchors must be set before the batch can be processed".into(),
            ));
        }
        self.invalidate();

        let anchor_pairs = self
            .table
            .included()
            .filter_map(|row| {
                self.canonical_anchor(&row.sample_name)
                    .map(|name| (name.to_owned(), row.value))
            })
            .collect::<Vec<_>>();
        if anchor_pairs.is_empty() {
            return Err(Error::Fit(
                "no rows matched the provided anchor standards".into(),
            ));
        }
        let anchor_stats = aggregate_by(anchor_pairs);
        strategy.fit(&anchor_stats, &self.anchors)?;
        log::info!("fitted {}", strategy.label());

        let corrected_replicates = strategy.apply(self.table.included_values().view())?;

        let samples = aggregate_by(
            self.table
                .included()
                .map(|row| (row.sample_name.clone(), row.value)),
        );
        let summary = samples
            .into_iter()
            .map(|(name, raw)| {
                let propagation = propagate_sample(strategy.as_ref(), &raw)?;
                Ok((name, SampleSummary { raw, propagation }))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        log::info!(
            "calibrated {} samples from {} replicates",
            summary.len(),
            corrected_replicates.len()
        );

        self.processed = Some(Processed {
            strategy,
            corrected_replicates,
            summary,
        });
        self.state = BatchState::Processed;
        Ok(())
    }

    fn processed(&self) -> Result<&Processed> {
        self.processed.as_ref().ok_or_else(|| {
            Error::State("the batch must be processed before results are available".into())
        })
    }

    /// The client report, rounded to the configured number of decimals
    ///
    /// # Errors
    /// Returns [`Error::State`] before the batch has been processed.
    pub fn report(&mut self) -> Result<BTreeMap<String, ReportRow>> {
        let decimals = self.config.report_decimals;
        let report = self
            .processed()?
            .summary
            .iter()
            .map(|(name, sample)| {
                (
                    name.clone(),
                    ReportRow {
                        corrected_value: round(sample.propagation.value, decimals),
                        combined_uncertainty: round(sample.propagation.uncertainty, decimals),
                        count: sample.raw.count,
                    },
                )
            })
            .collect();
        self.state = BatchState::Reported;
        Ok(report)
    }

    /// Trueness of every sample matching a registered control standard
    ///
    /// The table is empty when no sample matches a control.
    ///
    /// # Errors
    /// Returns [`Error::State`] before the batch has been processed.
    pub fn qaqc(&self) -> Result<BTreeMap<String, QaqcRow>> {
        let processed = self.processed()?;
        Ok(processed
            .summary
            .iter()
            .filter_map(|(name, sample)| {
                let control = self
                    .controls
                    .values()
                    .find(|control| control.matches(name))?;
                let corrected_value = sample.propagation.value;
                let bias = corrected_value - control.true_value();
                Some((
                    name.clone(),
                    QaqcRow {
                        true_value: control.true_value(),
                        corrected_value,
                        bias,
                        within_tolerance: bias.abs() < 2.0 * sample.propagation.uncertainty,
                    },
                ))
            })
            .collect())
    }

    /// Full precision results for every sample
    ///
    /// # Errors
    /// Returns [`Error::State`] before the batch has been processed.
    pub fn results(&self) -> Result<Vec<CalculationResult>> {
        let processed = self.processed()?;
        let calibration = processed.strategy.label();
        Ok(processed
            .summary
            .iter()
            .map(|(name, sample)| CalculationResult {
                identifier: name.clone(),
                raw_mean: sample.raw.mean,
                corrected_value: sample.propagation.value,
                combined_uncertainty: sample.propagation.uncertainty,
                calibration: calibration.clone(),
            })
            .collect())
    }

    /// Row level corrections of the included replicates, for diagnostics
    ///
    /// # Errors
    /// Returns [`Error::State`] before the batch has been processed.
    pub fn corrected_replicates(&self) -> Result<Vec<CorrectedReplicate>> {
        let processed = self.processed()?;
        Ok(self
            .table
            .included()
            .zip(processed.corrected_replicates.iter())
            .map(|(row, &corrected_value)| CorrectedReplicate {
                row: row.row,
                sample_name: row.sample_name.clone(),
                raw_value: row.value,
                corrected_value,
            })
            .collect())
    }

    /// The fitted strategy of the last successful run
    ///
    /// # Errors
    /// Returns [`Error::State`] before the batch has been processed.
    pub fn strategy(&self) -> Result<&dyn CalibrationStrategy> {
        Ok(self.processed()?.strategy.as_ref())
    }
}

fn round(value: f64, decimals: u8) -> f64 {
    let factor = 10f64.powi(i32::from(decimals));
    (value * factor).round() / factor
}
