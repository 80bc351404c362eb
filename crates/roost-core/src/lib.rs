pub mod app;
pub mod comm;
pub mod error;
pub mod host;
pub mod kea;
pub mod lock;
pub mod manager;
pub mod store;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, RoostError};
