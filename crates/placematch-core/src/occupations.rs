//! Occupation reference data.
//!
//! ROME occupation families and their appellation codes, loaded from
//! `config/occupations.yaml`. The external companies API takes a single ROME
//! code, so appellation-only queries are resolved through this directory.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Appellation {
    pub code: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Occupation {
    pub rome_code: String,
    pub rome_label: String,
    pub appellations: Vec<Appellation>,
}

#[derive(Debug, Deserialize)]
pub struct OccupationsFile {
    pub occupations: Vec<Occupation>,
}

/// Indexed occupation reference data.
#[derive(Debug, Clone)]
pub struct OccupationDirectory {
    occupations: Vec<Occupation>,
    rome_by_appellation: HashMap<String, usize>,
    index_by_rome: HashMap<String, usize>,
}

impl OccupationDirectory {
    /// Builds the directory, rejecting duplicate ROME or appellation codes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on empty/duplicate codes.
    pub fn from_file(file: OccupationsFile) -> Result<Self, ConfigError> {
        let mut rome_by_appellation = HashMap::new();
        let mut index_by_rome = HashMap::new();

        for (index, occupation) in file.occupations.iter().enumerate() {
            if occupation.rome_code.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "occupation rome_code must be non-empty".to_owned(),
                ));
            }
            if index_by_rome
                .insert(occupation.rome_code.clone(), index)
                .is_some()
            {
                return Err(ConfigError::Validation(format!(
                    "duplicate rome code: '{}'",
                    occupation.rome_code
                )));
            }
            for appellation in &occupation.appellations {
                if rome_by_appellation
                    .insert(appellation.code.clone(), index)
                    .is_some()
                {
                    return Err(ConfigError::Validation(format!(
                        "duplicate appellation code: '{}' (under rome '{}')",
                        appellation.code, occupation.rome_code
                    )));
                }
            }
        }

        Ok(Self {
            occupations: file.occupations,
            rome_by_appellation,
            index_by_rome,
        })
    }

    /// The occupation family an appellation code belongs to, if known.
    #[must_use]
    pub fn rome_for_appellation(&self, appellation_code: &str) -> Option<&Occupation> {
        self.rome_by_appellation
            .get(appellation_code)
            .map(|&index| &self.occupations[index])
    }

    #[must_use]
    pub fn rome_label(&self, rome_code: &str) -> Option<&str> {
        self.index_by_rome
            .get(rome_code)
            .map(|&index| self.occupations[index].rome_label.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.occupations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occupations.is_empty()
    }
}

/// Load and index the occupation reference file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails
/// validation.
pub fn load_occupations(path: &Path) -> Result<OccupationDirectory, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReferenceFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    let file: OccupationsFile =
        serde_yaml::from_str(&content).map_err(ConfigError::ReferenceFileParse)?;
    OccupationDirectory::from_file(file)
}
