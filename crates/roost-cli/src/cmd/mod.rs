pub mod app;
pub mod changes;
pub mod host;
pub mod sweep;
