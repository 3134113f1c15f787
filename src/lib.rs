//! Benchmarks JavaScript minifiers: output size, gzip/brotli size, build
//! time, optional correctness tests and browser performance audits, with
//! an HTML comparison report.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod harness;
pub mod render;
pub mod runner;
pub mod schema;
pub mod server;
pub mod suite;
pub mod transform;

pub use catalog::Catalog;
pub use config::Settings;
pub use error::{Error, Result};
