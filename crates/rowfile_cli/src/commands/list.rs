//! List command implementation.

use super::Target;
use serde::Serialize;

/// One listed file.
#[derive(Debug, Serialize)]
pub struct ListEntry {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Runs the list command.
pub fn run(target: &Target, extension: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = target.open()?;
    let names = store.list_files(extension)?;

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let size = store.driver().file_size(&name)?.unwrap_or(0);
        entries.push(ListEntry { name, size });
    }
    store.stop();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            for entry in &entries {
                println!("{:>12}  {}", entry.size, entry.name);
            }
            println!("{} file(s)", entries.len());
        }
    }
    Ok(())
}
