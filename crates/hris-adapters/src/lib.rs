//! CSV source adapter + total field normalizers for HRIS ingestion.

mod normalize;
mod source;

pub use normalize::{is_null_sentinel, parse_date, parse_identifier, split_name, PersonName};
pub use source::{CsvSource, CsvWindow, RawRow, SourceError, Window};

pub const CRATE_NAME: &str = "hris-adapters";
