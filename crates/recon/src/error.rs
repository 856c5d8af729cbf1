use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad threshold, empty rule, etc.).
    ConfigValidation(String),
    /// Missing required column in input data.
    MissingColumn { column: String },
    /// Malformed CSV (unbalanced quotes, ragged rows, bad header).
    Csv(String),
    /// A correction rule matched no rows. The rule list is stale relative to the data.
    RuleMatchedNothing { rule: usize, description: String },
    /// A correction rule references a column the input does not carry.
    RuleUnknownColumn { rule: usize, column: String },
    /// A coordinate-copying rule found no source rows for a matched point.
    RuleSourceMissing { rule: usize, point: String },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { column } => {
                write!(f, "input is missing required column '{column}'")
            }
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::RuleMatchedNothing { rule, description } => {
                write!(f, "correction rule #{rule} matched no rows: {description}")
            }
            Self::RuleUnknownColumn { rule, column } => {
                write!(f, "correction rule #{rule}: unknown column '{column}'")
            }
            Self::RuleSourceMissing { rule, point } => {
                write!(f, "correction rule #{rule}: no coordinates to copy for {point}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<csv::Error> for ReconError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}
