//! Upload work: copy local files to their remote destinations.
//!
//! Missing local files are logged and skipped. Remote failures abort the
//! whole batch.

use super::{StopSignal, TransferUnit};
use crate::error::Result;
use crate::logging::{format_millis, log_error, log_info};
use crate::remote::{parent_dir, RemoteChannel};
use std::fs::File;
use std::path::Path;
use std::time::Instant;

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

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
        stop.check()?;

        let local = unit.source();
        let remote = unit.destination();
        if local.is_empty() {
            continue;
        }

        let local_path = Path::new(local);
        if !is_readable_file(local_path) {
            log_error!("Missing local file '{}'", local);
            continue;
        }

        if let Some(dir) = parent_dir(remote) {
            ensure_remote_dir(channel, dir, &home)?;
        }

        channel.put(local_path, remote)?;
        log_info!("Uploaded '{}' to '{}'", local, remote);
    }

    log_info!(
        "Took {} to process {} file uploads",
        format_millis(start.elapsed().as_millis()),
        units.len()
    );
    Ok(true)
}

/// Create `dir` if it cannot be entered, then return to `home` either way.
fn ensure_remote_dir(channel: &mut dyn RemoteChannel, dir: &str, home: &str) -> Result<()> {
    let created = match channel.change_dir(dir) {
        Ok(()) => Ok(()),
        Err(_) => channel.make_dir(dir).map(|()| {
            log_info!("Created remote directory '{}'", dir);
        }),
    };

    let restored = channel.change_dir(home);
    created?;
    restored?;
    Ok(())
}
