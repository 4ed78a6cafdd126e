//! I/O adapters for the orchestration loop.

pub mod atomic;
pub mod config;
pub mod event_log;
pub mod file_queue;
pub mod file_store;
pub mod inference;
pub mod init;
pub mod operator;
pub mod process;
pub mod prompt;
pub mod shell;
pub mod snapshot_store;
