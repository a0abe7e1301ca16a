//! CLI module
//!
//! Command-line interface for calling the Web API.
//!
//! # Commands
//!
//! - `get` - Fetch one resource
//! - `pages` - Walk a paginated resource

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;
