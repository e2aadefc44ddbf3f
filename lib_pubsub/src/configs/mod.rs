//! # Configuration Modules
//!
//! Connection options for the session engine and the loader that layers
//! defaults, an optional JSON5 file and environment variables.

/// Connection options and their layered loading.
pub mod options;
