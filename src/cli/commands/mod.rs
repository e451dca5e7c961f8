//! CLI command implementations

pub mod config;
pub mod init;
pub mod serve;

pub use config::execute as config;
pub use init::execute as init;
pub use serve::execute as serve;
