//! History source implementations.

pub mod export;

pub use export::ExportHistorySource;
