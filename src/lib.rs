//! depot - Self-hosted Maven artifact repository
//!
//! One writable `local` repository unified with an ordered list of
//! read-only remote mirrors; release artifacts are fetched from the first
//! responsive mirror and cached on disk, snapshot versions follow the Maven
//! rewrite-and-replace upload protocol.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod repo;

pub use error::{DepotError, DepotResult};
