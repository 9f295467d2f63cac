//! Rm command implementation.

use super::{require_file, Target};
use tracing::info;

/// Runs the rm command.
pub fn run(target: &Target, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = target.open()?;
    require_file(&store, name)?;

    let file = store.create_file(name)?;
    file.delete()?;
    store.stop();

    info!(file = name, "deleted");
    Ok(())
}
