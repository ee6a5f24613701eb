//! Error type shared by the solver, the instance reader and the exporters.

use std::fmt;
use std::io;
use std::num::{ParseFloatError, ParseIntError};

/// Errors produced by the HGS-CVRP library.
#[derive(Debug)]
pub enum SolverError {
    /// Reading or writing a file failed
    Io(io::Error),
    /// Malformed instance file
    Parse(String),
    /// Configuration values that cannot produce a meaningful search
    InvalidConfig(String),
    /// Selection was requested from a population with no individuals
    EmptyPopulation,
    /// JSON (de)serialization failed
    Json(serde_json::Error),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Io(err) => write!(f, "i/o error: {}", err),
            SolverError::Parse(msg) => write!(f, "parse error: {}", msg),
            SolverError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            SolverError::EmptyPopulation => write!(f, "cannot select from an empty population"),
            SolverError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolverError::Io(err) => Some(err),
            SolverError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SolverError {
    fn from(err: io::Error) -> Self {
        SolverError::Io(err)
    }
}

impl From<serde_json::Error> for SolverError {
    fn from(err: serde_json::Error) -> Self {
        SolverError::Json(err)
    }
}

impl From<ParseIntError> for SolverError {
    fn from(err: ParseIntError) -> Self {
        SolverError::Parse(err.to_string())
    }
}

impl From<ParseFloatError> for SolverError {
    fn from(err: ParseFloatError) -> Self {
        SolverError::Parse(err.to_string())
    }
}
