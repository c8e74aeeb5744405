//! # CLI Commands
//!
//! One module per subcommand; each exposes an `Args` struct for clap and a
//! `run` function returning the process exit code.

pub mod check;
pub mod list;
pub mod prompt;
pub mod validate;
