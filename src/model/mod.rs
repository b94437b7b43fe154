//! Types that represent the core data model, such as `FieldMapping`, `LearnedTemplate` and
//! `ParsedTransaction`, and the primitives that normalize dates and amounts.
mod amount;
mod date;
mod extraction;
mod field;
mod mapping;
mod table;
mod template;
mod transaction;

pub use amount::{format_amount, parse_amount};
pub use date::{
    detect_format, excel_serial_to_date, parse_date, parse_date_lenient, DateFormat, DATE_FORMATS,
};
pub use extraction::{ExtractedField, ExtractionResult, ValueType};
pub(crate) use field::SUGGESTION_ORDER;
pub use field::{FieldKind, SystemField};
pub use mapping::{ColumnSource, FieldMapping, FieldSource, MappingError, MappingProblem};
pub(crate) use table::is_blank_row;
pub use table::{Cell, RawTable};
pub use template::{DetectionPatterns, FileKind, LearnedTemplate, NewTemplate};
pub use transaction::{ParseOutcome, ParsedTransaction, MAX_ROW_ERRORS};
