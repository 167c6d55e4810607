use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A reference material with a certified delta value
///
/// Reference materials are matched against the free-text sample names typed into the instrument
/// software, so every standard carries a set of aliases. Matching ignores case and surrounding
/// whitespace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReferenceMaterial {
    /// Canonical identifier of the standard
    name: String,
    /// Certified delta value
    true_value: f64,
    /// Certified 1-sigma uncertainty
    true_uncertainty: f64,
    /// Alternative names the standard is recorded under
    aliases: Vec<String>,
    #[serde(skip)]
    lookup: BTreeSet<String>,
}

fn normalise(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ReferenceMaterial {
    /// Define a reference material
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if the certified uncertainty is negative or not a number.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        true_value: f64,
        true_uncertainty: f64,
        aliases: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let name = name.into();
        if true_uncertainty.is_nan() || true_uncertainty < 0.0 {
            return Err(Error::Validation(format!(
                "uncertainty for {name} cannot be negative, got {true_uncertainty}"
            )));
        }
        if !true_value.is_finite() {
            return Err(Error::Validation(format!(
                "certified value for {name} must be finite, got {true_value}"
            )));
        }
        let aliases: Vec<String> = aliases.into_iter().map(Into::into).collect();
        let lookup = std::iter::once(&name)
            .chain(aliases.iter())
            .map(|n| normalise(n))
            .collect();

        Ok(Self {
            name,
            true_value,
            true_uncertainty,
            aliases,
            lookup,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn true_value(&self) -> f64 {
        self.true_value
    }

    pub const fn true_uncertainty(&self) -> f64 {
        self.true_uncertainty
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Whether `candidate` names this standard or one of its aliases
    pub fn matches(&self, candidate: &str) -> bool {
        self.lookup.contains(&normalise(candidate))
    }

    /// As [`Self::matches`], for cells which may be empty. A missing name never matches.
    pub fn matches_opt(&self, candidate: Option<&str>) -> bool {
        candidate.map_or(false, |candidate| self.matches(candidate))
    }
}

impl fmt::Display for ReferenceMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2} \u{b1} {:.2}\u{2030}",
            self.name, self.true_value, self.true_uncertainty
        )
    }
}

/// On-disk description of a custom reference material
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StandardDefinition {
    pub name: String,
    pub true_value: f64,
    pub true_uncertainty: f64,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl TryFrom<&StandardDefinition> for ReferenceMaterial {
    type Error = Error;

    fn try_from(definition: &StandardDefinition) -> Result<Self> {
        Self::new(
            definition.name.clone(),
            definition.true_value,
            definition.true_uncertainty,
            definition.aliases.iter().cloned(),
        )
    }
}

/// The nitrogen reference materials known without any configuration
///
/// Certified values are on the AIR scale, in per mil.
pub fn default_standards() -> Vec<ReferenceMaterial> {
    [
        ("USGS32", 180.0, 1.0, ["USGS-32", "KN032"]),
        ("USGS34", -1.8, 0.2, ["USGS-34", "KN034"]),
        ("USGS35", 2.7, 0.2, ["USGS-35", "KN035"]),
    ]
    .into_iter()
    .map(|(name, value, uncertainty, aliases)| ReferenceMaterial {
        name: name.to_owned(),
        true_value: value,
        true_uncertainty: uncertainty,
        aliases: aliases.iter().map(|&a| a.to_owned()).collect(),
        lookup: std::iter::once(name)
            .chain(aliases)
            .map(normalise)
            .collect(),
    })
    .collect()
}

/// Find the standard matching `name`
///
/// The custom standards are searched first, then the builtin defaults. The first match wins.
/// Absence is not an error here: the caller decides whether a missing standard is fatal.
pub fn lookup(name: &str, custom: &[ReferenceMaterial]) -> Option<ReferenceMaterial> {
    custom
        .iter()
        .find(|standard| standard.matches(name))
        .cloned()
        .or_else(|| {
            default_standards()
                .into_iter()
                .find(|standard| standard.matches(name))
        })
}

/// A searchable collection of user-defined standards, backed by the builtin defaults
#[derive(Clone, Debug, Default)]
pub struct Registry {
    custom: Vec<ReferenceMaterial>,
}

impl Registry {
    pub fn new(custom: Vec<ReferenceMaterial>) -> Self {
        Self { custom }
    }

    /// Build a registry from configured definitions, validating each one
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if any definition is not a valid reference material.
    pub fn from_definitions(definitions: &[StandardDefinition]) -> Result<Self> {
        let custom = definitions
            .iter()
            .map(ReferenceMaterial::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { custom })
    }

    pub fn custom(&self) -> &[ReferenceMaterial] {
        &self.custom
    }

    pub fn lookup(&self, name: &str) -> Option<ReferenceMaterial> {
        lookup(name, &self.custom)
    }
}
