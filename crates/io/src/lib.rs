// File I/O for georecon: CSV tables, markdown logs, JSON reports

pub mod csv;
pub mod json;
pub mod markdown;
