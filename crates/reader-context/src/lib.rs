//! Per-request reader context — the contract object-storage reader backends
//! (COG, Zarr/NetCDF) consult for the current storage credential.
//!
//! This crate exists so the auth middleware (C3) never has to reach into a
//! process-global mutable slot to hand a bearer token to a reader backend.
//! Two channels are supported, matching the reader binding contract:
//!
//! - [`RequestCredential::scope`]: a task-scoped key-value bag (a
//!   `tokio::task_local!`), consulted via [`RequestCredential::current`].
//!   This is the preferred channel — it is request-scoped by construction
//!   and needs no locking on the read path.
//! - [`scoped_env`]: for reader backends that only accept credentials via
//!   process-global environment variables (the common case for C-library
//!   bindings such as GDAL). Mutation is serialized by a process-wide mutex
//!   and unconditionally reversed when the guard drops, so no request ever
//!   observes another request's credential through the environment.

mod credential;
mod env_scope;

pub use credential::{RequestCredential, StorageCredential};
pub use env_scope::scoped_env;
