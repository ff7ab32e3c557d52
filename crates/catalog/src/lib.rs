//! Catalog service (C5): introspects configured PostGIS schemas into a set
//! of OGC collections, bound to the connection pool's rotation lifecycle.

mod catalog;
mod collection;
mod error;
mod service;

pub use catalog::{load, Catalog};
pub use collection::Collection;
pub use error::{Error, Result};
pub use service::CatalogService;
