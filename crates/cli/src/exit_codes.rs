//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract. Scripts rely on them.
//!
//! | Code | Meaning                                                        |
//! |------|----------------------------------------------------------------|
//! | 0    | Success, nothing left for manual curation                      |
//! | 1    | Manual review required (flagged groups, failed cross-scope)    |
//! | 2    | Usage error (bad arguments, invalid flag value)                |
//! | 3    | Input error (unreadable file, missing column, malformed CSV)   |
//! | 4    | Config error (bad TOML, invalid value, stale correction rule)  |
//! | 5    | Output write error                                             |

/// Success - outputs written, no open review items.
pub const EXIT_SUCCESS: u8 = 0;

/// Outputs written, but flagged groups or unresolved conflicts remain.
pub const EXIT_REVIEW: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with this code on its own parse failures.
pub const EXIT_USAGE: u8 = 2;

/// Input file could not be read or parsed.
pub const EXIT_INPUT: u8 = 3;

/// Configuration could not be parsed or validated, or a correction rule is stale.
pub const EXIT_CONFIG: u8 = 4;

/// An output file could not be written.
pub const EXIT_OUTPUT: u8 = 5;
