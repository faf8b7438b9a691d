//! Data-driven lookup tables: category priority, state names, urgency tiers.
//!
//! The built-in defaults mirror `config/catalog.yaml`; a deployment can ship
//! its own file without touching code.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CATEGORY_RANKS: [&str; 12] = [
    "Unclaimed money & refunds",
    "Class action settlements",
    "Data breach",
    "Privacy",
    "Grants",
    "Tax credits",
    "Benefits & assistance",
    "Health & Safety",
    "Consumer Products",
    "Technology",
    "Home & Garden",
    "Other",
];

const DEFAULT_STATES: [(&str, &str); 51] = [
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "District of Columbia"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Day counts bounding each urgency badge tier (inclusive upper bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyThresholds {
    pub urgent: i64,
    pub warning: i64,
    pub notice: i64,
    /// Above this the value is a sentinel, not a real countdown.
    pub max_days: i64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            urgent: 7,
            warning: 30,
            notice: 60,
            max_days: 900,
        }
    }
}

fn default_ending_window_days() -> i64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Category labels in display priority order; unknown labels rank last.
    pub category_ranks: Vec<String>,
    /// Two-letter code to full state name.
    pub states: BTreeMap<String, String>,
    #[serde(default)]
    pub urgency: UrgencyThresholds,
    /// `ending` category filter: `0 < days_left < ending_window_days`.
    #[serde(default = "default_ending_window_days")]
    pub ending_window_days: i64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            category_ranks: DEFAULT_CATEGORY_RANKS.iter().map(|c| c.to_string()).collect(),
            states: DEFAULT_STATES
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
            urgency: UrgencyThresholds::default(),
            ending_window_days: default_ending_window_days(),
        }
    }
}

impl Catalog {
    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_yaml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Missing file means built-in defaults; a present but broken file is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.category_ranks.is_empty() {
            return Err(CatalogError::Invalid("category_ranks is empty".into()));
        }
        let mut seen = HashSet::new();
        for category in &self.category_ranks {
            if !seen.insert(category.to_lowercase()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate category rank: {category}"
                )));
            }
        }
        let u = &self.urgency;
        if !(u.urgent <= u.warning && u.warning <= u.notice && u.notice <= u.max_days) {
            return Err(CatalogError::Invalid(
                "urgency thresholds must be non-decreasing".into(),
            ));
        }
        Ok(())
    }

    pub fn category_rank(&self, category: &str) -> usize {
        self.category_ranks
            .iter()
            .position(|c| c.eq_ignore_ascii_case(category))
            .unwrap_or(self.category_ranks.len())
    }

    pub fn state_full_name(&self, code: &str) -> Option<&str> {
        self.states
            .get(&code.trim().to_ascii_uppercase())
            .map(String::as_str)
    }
}
