//! Two-phase remote scan: multipart upload, then poll for the report.

pub mod client;
pub mod orchestrator;
pub mod verdict;

pub use client::{AnalysisReport, HttpScanService, ScanService};
pub use orchestrator::ScanOrchestrator;
pub use verdict::{EngineStats, ScanVerdict};
