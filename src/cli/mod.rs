//! CLI module for replypilot - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the scheduler,
//! triggering phases by hand, and inspecting or editing the reply queue.

pub mod commands;

pub use commands::Cli;
