//! LRS Editor - Application Library
//!
//! Batch front end over `lrs-lib`: keeps a project document on disk and runs route updates,
//! approvals and event checks against it, one command per invocation.

mod app;
mod logging;

pub use app::settings::{ClassKind, Command, Settings};
pub use app::storage::{FileStorage, MemoryStorage, StorageBackend, StorageError};
pub use app::{AppError, AppResult, LrsEditorApp};
pub use logging::setup_logging;
