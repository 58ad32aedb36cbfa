// ABOUTME: Library module for sqlite-dist
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod integrity;
pub mod manifest;
pub mod migration;
pub mod remote;
pub mod sqlite;
pub mod table_rules;
pub mod utils;
