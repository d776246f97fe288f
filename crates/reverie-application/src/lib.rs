//! Reverie application layer.
//!
//! Use cases composing the infrastructure providers behind the core
//! contracts: the storage orchestrator ([`JournalUseCase`]) and the
//! hybrid analysis engine ([`AnalysisEngine`]).

pub mod analysis;
mod journal_usecase;

pub use analysis::AnalysisEngine;
pub use journal_usecase::{CleanupReport, ExportBundle, JournalUseCase, StorageStats};
