//! Cat command implementation.

use super::{require_file, Target};
use std::io::Write;

/// Runs the cat command.
pub fn run(target: &Target, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = target.open()?;
    require_file(&store, name)?;

    let file = store.create_file(name)?;
    file.open()?;

    let mut buf = store.new_buffer(store.buffer_size());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        let n = file.read(&mut buf[..])?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    out.flush()?;

    store.release_buffer(buf);
    file.close()?;
    store.stop();
    Ok(())
}
