pub mod types;

pub use types::{Detail, DetailField, Overview, Record, Section, SectionField};
