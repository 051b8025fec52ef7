//! # estimo-settings
//!
//! Configuration for the estimo server, loaded from three layers (in priority order):
//! 1. **Compiled defaults** via [`EstimoSettings::default()`]
//! 2. **Settings file**: `~/.estimo/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `SERVER_*`, `MEMORY_*`, `STORAGE_BACKEND`, `SQLITE_PATH`, `LOG_*`
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::{
    EstimoSettings, LoggingSettings, MemorySettings, ServerSettings, StorageBackend,
    StorageSettings,
};
