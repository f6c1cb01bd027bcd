//! tradeflow-cli: command line front end for `tradeflow`.
//!
//! Loads configuration and credentials, initialises logging, builds a
//! [`tradeflow::WorkflowRunner`] over a WebDriver endpoint and prints one
//! structured result per command.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
