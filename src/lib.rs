//! tankobon: A self-hosted manga and comic library server for CBZ archives.
//!
//! This crate provides a small web server that scans configured library
//! directories for CBZ archives, generates cover thumbnails, and serves
//! volume pages to a reader UI, with cookie-based session authentication
//! and a first-run setup wizard.
//!
//! # Features
//!
//! - CBZ page listing and extraction
//! - Library scanning with idempotent catalog upserts
//! - Cover thumbnail generation
//! - Cookie sessions with Argon2 password hashing
//! - First-run setup gate and bootstrap wizard
//! - Avatar and profile header uploads

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CBZ archive reading.
pub mod archive;
/// Authentication and sessions.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Library scanning and thumbnails.
pub mod library;
/// HTTP server.
pub mod server;
/// First-run bootstrap.
pub mod setup;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
