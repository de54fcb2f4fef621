pub mod document;
pub mod enums;

pub use document::{document_id, BookMetadata, Classification, DocumentState};
pub use enums::{DocumentKind, Stage};
