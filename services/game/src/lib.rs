//! Millionaire Game Service Library Crate
//!
//! Environment configuration and the interactive terminal front-end for the
//! quiz. The `millionaire` binary is a thin wrapper that wires these to the
//! core crate, stdin and stdout.

pub mod config;
pub mod runner;
pub mod terminal;
