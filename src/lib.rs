//! Bookshelf: an inbox-to-library pipeline for PDFs and EPUBs.
//!
//! Files dropped into an inbox directory are run through three stages:
//! text extraction (with an OCR fallback for scanned PDFs), LLM-backed
//! metadata inference and classification, and finalization into a
//! per-category library directory. Each stage checkpoints the full
//! document state to SQLite, so an interrupted run resumes where it
//! stopped and a finished document is never processed twice.

pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod services;
