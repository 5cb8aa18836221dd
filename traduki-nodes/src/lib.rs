//! Traduki Nodes
//!
//! Tree export/import engine for dimensioned content:
//! - Selection of the node records to export
//! - Streaming XML writer and reader for format versions 1.0 and 2.0
//! - Reconciliation of translated variants against a target workspace
//! - Export and import services driving a whole run

pub mod error;
pub mod export;
pub mod format;
pub mod import;
pub mod reader;
pub mod reconciler;
pub mod selector;
pub mod writer;

pub use error::{Result, TradukiError};
pub use export::{ExportOptions, ExportPlan, ExportService, ExportSummary};
pub use format::FormatVersion;
pub use import::{ImportService, ImportSummary};
pub use reader::{ImportHeader, ParsedVariant, ReaderEvent, TreeReader};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use selector::{SelectionMode, Selector, deduplicate, open_source_contexts, sort_selection};
pub use writer::{DocumentHeader, TreeWriter};
