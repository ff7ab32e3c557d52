//! Service configuration.
//!
//! Config loading and validation live in `common` (shared by every crate
//! that needs a `PgAuthMode`/`StorageConfig` field), so this module is just
//! the binary's entry point into it rather than a parallel struct.

pub use common::{Config, PgAuthMode};
