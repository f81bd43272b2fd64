//! Configuration loader and schema types.
//!
//! Settings control how directories are scanned and how track metadata is
//! written back into files.

mod load;
mod schema;

pub use load::{default_config_path, resolve_config_path};
pub use schema::*;

#[cfg(test)]
mod tests;
