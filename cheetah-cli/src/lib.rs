//! Cheetah CLI - Command-line interface for Cheetah schema migrations.
//!
//! Generates migration files by diffing TOML entity descriptors against a
//! live PostgreSQL database, and applies pending files.

pub mod cli;
pub mod commands;
pub mod config;
pub mod entities;
pub mod error;
pub mod logging;
pub mod output;
