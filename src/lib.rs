//! turnwarden - turn tracking and timeline history for tabletop campaigns
//!
//! This library provides the SQLite store and the turn engine.
//! The CLI is in `main.rs`.

pub mod config;
pub mod db;
pub mod dice;
pub mod paths;
pub mod timeline;
