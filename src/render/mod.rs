//! Presentation of a [`ReportBundle`](crate::schema::ReportBundle).
//!
//! Renderers read only the bundle; they never see trial records.

pub mod table;
pub mod text;
