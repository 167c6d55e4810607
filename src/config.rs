use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::standards::{Registry, StandardDefinition};
use crate::{Error, Result};

/// Internal name of the sample identifier column
pub const SAMPLE_NAME: &str = "sample_name";
/// Internal name of the row identifier column
pub const ROW: &str = "row";
/// Internal name of the peak number column
pub const PEAK: &str = "peak_nr";

/// What to do when a standard is registered both as an anchor and as a control
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StandardOverlap {
    /// The standard is used for fitting and is also reported in the QA/QC table
    #[default]
    Allow,
    /// Registering the same standard in both roles is a configuration error
    Forbid,
}

/// Configuration of one isotope system on one instrument
///
/// A configuration is usually read from a TOML file such as
///
/// ```toml
/// name = "Nitrogen (N2)"
/// target_column = "d15n"
/// target_peak = 2
///
/// [column_mapping]
/// "d 15N/14N" = "d15n"
///
/// [[standards]]
/// name = "IAEA-N-1"
/// true_value = 0.4
/// true_uncertainty = 0.2
/// aliases = ["N1"]
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SystemConfig {
    pub name: String,
    /// Internal name of the column holding the delta value to calibrate
    pub target_column: String,
    /// Keep only rows from this peak, when set
    #[serde(default)]
    pub target_peak: Option<i64>,
    /// Number of decimals in the client report
    #[serde(default = "default_report_decimals")]
    pub report_decimals: u8,
    #[serde(default)]
    pub standard_overlap: StandardOverlap,
    /// Instrument header to internal column name, applied on top of the shared Isodat headers
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,
    /// Reference materials searched before the builtin ones
    #[serde(default)]
    pub standards: Vec<StandardDefinition>,
}

const fn default_report_decimals() -> u8 {
    2
}

/// Isodat headers common to every isotope system
const SHARED_MAPPING: [(&str, &str); 7] = [
    ("Row", ROW),
    ("Identifier 1", SAMPLE_NAME),
    ("Identifier 2", "sample_id_2"),
    ("Peak Nr", PEAK),
    ("Amount", "amount"),
    ("Area All", "area_all"),
    ("Comment", "comment"),
];

impl SystemConfig {
    /// Dinitrogen analysis of d15N, keeping the sample gas peak
    pub fn nitrogen() -> Self {
        let column_mapping = [
            ("d 15N/14N", "d15n"),
            ("R 15N/14N", "r15n"),
            ("Ampl 28", "amp_28"),
            ("Ampl 29", "amp_29"),
            ("Area 28", "area_28"),
            ("Area 29", "area_29"),
        ]
        .into_iter()
        .map(|(header, column)| (header.to_owned(), column.to_owned()))
        .collect();

        Self {
            name: "Nitrogen (N2)".to_owned(),
            target_column: "d15n".to_owned(),
            target_peak: Some(2),
            report_decimals: default_report_decimals(),
            standard_overlap: StandardOverlap::default(),
            column_mapping,
            standards: vec![],
        }
    }

    /// Parse and validate a configuration from TOML
    ///
    /// # Errors
    /// Returns an error if the document is malformed or describes an invalid configuration.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or its contents are invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check the configuration is internally consistent
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an empty target column and [`Error::Validation`] for
    /// invalid custom standards.
    pub fn validate(&self) -> Result<()> {
        if self.target_column.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "system '{}' does not name a target column",
                self.name
            )));
        }
        self.registry().map(|_| ())
    }

    /// The full header mapping, the system specific entries taking precedence
    pub fn mapping(&self) -> BTreeMap<String, String> {
        let mut mapping: BTreeMap<String, String> = SHARED_MAPPING
            .iter()
            .map(|&(header, column)| (header.to_owned(), column.to_owned()))
            .collect();
        mapping.extend(self.column_mapping.clone());
        mapping
    }

    /// The registry of custom standards described by this configuration
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if a custom standard is invalid.
    pub fn registry(&self) -> Result<Registry> {
        Registry::from_definitions(&self.standards)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::nitrogen()
    }
}
