// src/lib.rs

//! Git repository analysis: history statistics for local folders, uploaded
//! archives and cloned GitHub repositories, served to a desktop front end.

pub mod analyzer;
pub mod archive;
pub mod callback;
pub mod clone;
pub mod config;
pub mod error;
pub mod github;
pub mod locator;
pub mod logging;
pub mod model;
pub mod server;
pub mod session;
pub mod shell;
pub mod worktree;

pub use error::{Error, Result};
