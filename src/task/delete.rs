//! Recursive remote delete.
//!
//! A directory is entered, emptied entry by entry, left, and then removed.
//! Paths that are already gone count as deleted. Any other failure aborts
//! the batch.

use super::{StopSignal, TransferUnit};
use crate::error::Result;
use crate::logging::{format_millis, log_error, log_info};
use crate::remote::{parent_dir, RemoteChannel};
use std::time::Instant;

pub(super) fn run(
    channel: &mut dyn RemoteChannel,
    units: &[TransferUnit],
    stop: &StopSignal,
) -> Result<bool> {
    if units.is_empty() {
        return Ok(true);
    }

    let start = Instant::now();
    let home = channel.current_dir()?;

    for unit in units {
        let path = unit.source();
        if let Err(e) = delete_path(channel, path, stop) {
            log_error!("Couldn't delete file: '{}': {}", path, e);
            return Err(e);
        }

        // Multi-segment paths leave us in their parent; later units are
        // relative to where we started.
        if channel.current_dir()? != home {
            channel.change_dir(&home)?;
        }
    }

    log_info!(
        "Took {} to delete {} files",
        format_millis(start.elapsed().as_millis()),
        units.len()
    );
    Ok(true)
}

fn delete_path(channel: &mut dyn RemoteChannel, path: &str, stop: &StopSignal) -> Result<()> {
    if path.is_empty() || path == "." || path == ".." {
        return Ok(());
    }
    stop.check()?;

    match channel.list(path) {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            log_info!("File doesn't exist: '{}'", path);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    if !channel.stat(path)?.is_dir {
        channel.remove_file(path)?;
        return Ok(());
    }

    channel.change_dir(path)?;

    let cwd = channel.current_dir()?;
    for entry in channel.list(&cwd)? {
        delete_path(channel, &entry.name, stop)?;
    }

    // The working directory is now the target, whatever form `path` took.
    // Step out of it before removing it.
    let full_path = channel.current_dir()?;
    if let Some(parent) = parent_dir(&full_path) {
        channel.change_dir(parent)?;
    }

    channel.remove_dir(&full_path)?;
    Ok(())
}
