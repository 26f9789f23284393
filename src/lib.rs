pub mod budget;
pub mod config;
pub mod error;
pub mod db;
pub mod graph;
pub mod mcp;

pub use config::Config;
pub use error::{GraphnavError, Result};
