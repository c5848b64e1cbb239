//! Nickclaim Runner - configuration, logging and process wiring for the
//! `nickclaim` binary

pub mod model;
pub mod startup;

pub use model::{Cli, Configuration};
