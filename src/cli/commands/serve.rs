//! Serve command - run the repository server

use crate::config::Config;
use crate::error::DepotResult;
use crate::http;

/// Execute the serve command
pub async fn execute(config: Config) -> DepotResult<()> {
    http::serve(config).await
}
