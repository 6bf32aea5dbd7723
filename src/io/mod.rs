//! Edge-list persistence.
//!
//! The CSV layout stores one edge event per row with configurable column
//! names and an optional list of per-dimension feature columns.

mod csv;

pub use self::csv::{read_csv, write_csv, CsvOptions};
