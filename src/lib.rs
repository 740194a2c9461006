// Library interface for yas
// This allows integration tests and external code to use yas's modules

pub mod cli;
pub mod cli_utils;
pub mod commands;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod home;
pub mod loader;
pub mod logging;
pub mod reference;
pub mod runtime;
pub mod storage;

// Re-export commonly used types
pub use context::LoadContext;
pub use error::{Error, Result};
pub use loader::{Execute, ModuleLoader};
pub use reference::normalize;
pub use runtime::RuntimeEnvironment;
pub use storage::{CacheStore, MemoryStore, RocksStore};
