//! County property roll import.

mod parser;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::domain::PropertyDraft;

#[derive(Debug)]
pub enum RollImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Invalid { line: usize, message: String },
}

impl RollImportError {
    fn invalid(line: usize, message: impl Into<String>) -> Self {
        Self::Invalid {
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RollImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollImportError::Io(err) => write!(f, "failed to read property roll: {}", err),
            RollImportError::Csv(err) => write!(f, "invalid property roll CSV data: {}", err),
            RollImportError::Invalid { line, message } => {
                write!(f, "property roll line {}: {}", line, message)
            }
        }
    }
}

impl std::error::Error for RollImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RollImportError::Io(err) => Some(err),
            RollImportError::Csv(err) => Some(err),
            RollImportError::Invalid { .. } => None,
        }
    }
}

impl From<std::io::Error> for RollImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RollImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Parse a roll export into property drafts. Any bad row fails the whole roll.
pub fn read_roll<R: Read>(reader: R) -> Result<Vec<PropertyDraft>, RollImportError> {
    parser::parse_records(reader)
}

pub fn read_roll_file<P: AsRef<Path>>(path: P) -> Result<Vec<PropertyDraft>, RollImportError> {
    let file = File::open(path)?;
    read_roll(file)
}
