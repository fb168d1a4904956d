pub mod backend;
pub mod cli;
pub mod closer;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod poll;
pub mod setup;
pub mod table;
pub mod target;

#[cfg(test)]
mod testing;

pub use error::{Result, SslcountError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
