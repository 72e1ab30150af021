//! Tessera Kernel Library
//!
//! Collection-oriented data access with event interception, and the plugin
//! lifecycle that populates it. The `tessera` binary wraps this library in a
//! small diagnostic CLI.

pub mod config;
pub mod db;
pub mod plugin;
