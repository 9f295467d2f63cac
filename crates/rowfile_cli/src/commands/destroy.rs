//! Destroy command implementation.

use super::Target;
use tracing::info;

/// Runs the destroy command.
///
/// Failures are reported through the log by the store.
pub fn run(target: &Target) -> Result<(), Box<dyn std::error::Error>> {
    let store = target.open()?;
    store.destroy();
    info!(db = %target.db().display(), "store destroyed");
    Ok(())
}
