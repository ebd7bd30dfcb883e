//! Error types shared by all parts of the engine.
use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CvfemError>;

/// Elements with a negative control-volume determinant, grouped by the part they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidElementReport {
    pub part_name: String,
    pub element_ids: Vec<u64>,
}

impl fmt::Display for InvalidElementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part {}: elements {:?}", self.part_name, self.element_ids)
    }
}

#[derive(Debug, Error)]
pub enum CvfemError {
    /// Missing or inconsistent input; raised while loading, before any solve.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A mesh entity violates an assumption of an algorithm, e.g. a boundary face
    /// that is not attached to exactly one element.
    #[error("precondition violated in {context}: {details}")]
    Precondition { context: &'static str, details: String },

    #[error("no master element for topology {0:?} in work set {1}")]
    UnsupportedTopology(crate::topology::Topology, &'static str),

    #[error("negative jacobian found in {} element(s): {}", count_elements(.0), format_reports(.0))]
    InvalidGeometry(Vec<InvalidElementReport>),

    #[error("field error: {0}")]
    Field(String),

    #[error("linear system error: {0}")]
    LinearSystem(String),
}

fn count_elements(reports: &[InvalidElementReport]) -> usize {
    reports.iter().map(|r| r.element_ids.len()).sum()
}

fn format_reports(reports: &[InvalidElementReport]) -> String {
    reports
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl CvfemError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn precondition(context: &'static str, details: impl Into<String>) -> Self {
        Self::Precondition {
            context,
            details: details.into(),
        }
    }

    /// Ids of all invalid elements carried by an `InvalidGeometry` error.
    pub fn invalid_element_ids(&self) -> Vec<u64> {
        match self {
            Self::InvalidGeometry(reports) => reports
                .iter()
                .flat_map(|r| r.element_ids.iter().copied())
                .collect(),
            _ => Vec::new(),
        }
    }
}
