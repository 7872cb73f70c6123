//! Existence check: every remote path must be listable.

use super::{StopSignal, TransferUnit};
use crate::error::Result;
use crate::logging::{format_millis, log_info};
use crate::remote::RemoteChannel;
use std::time::Instant;

/// Returns false at the first path that does not exist; later paths are not
/// probed.
pub(super) fn run(
    channel: &mut dyn RemoteChannel,
    units: &[TransferUnit],
    stop: &StopSignal,
) -> Result<bool> {
    if units.is_empty() {
        return Ok(true);
    }

    let start = Instant::now();

    for unit in units {
        stop.check()?;

        let path = unit.source();
        if path.is_empty() {
            continue;
        }

        match channel.list(path) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                log_info!("File doesn't exist: '{}'", path);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
    }

    log_info!(
        "Took {} to check {} files",
        format_millis(start.elapsed().as_millis()),
        units.len()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionParameters;
    use crate::remote::{Call, Connector, MemoryRemote, Op};

    fn channel(remote: &MemoryRemote) -> Box<dyn RemoteChannel> {
        let params = ConnectionParameters::builder()
            .host("memory")
            .create()
            .unwrap();
        remote.connect(&params).unwrap()
    }

    #[test]
    fn test_all_present() {
        let remote = MemoryRemote::new();
        remote.add_file("a.txt", b"a").add_dir("dir");
        let mut ch = channel(&remote);

        let units = vec![
            TransferUnit::remote("a.txt"),
            TransferUnit::remote(""),
            TransferUnit::remote("dir"),
        ];
        assert!(run(ch.as_mut(), &units, &StopSignal::new()).unwrap());
    }

    #[test]
    fn test_short_circuits_on_first_missing() {
        let remote = MemoryRemote::new();
        remote.add_file("a.txt", b"a").add_file("c.txt", b"c");
        let mut ch = channel(&remote);
        remote.clear_calls();

        let units = vec![
            TransferUnit::remote("a.txt"),
            TransferUnit::remote("b.txt"),
            TransferUnit::remote("c.txt"),
        ];
        assert!(!run(ch.as_mut(), &units, &StopSignal::new()).unwrap());

        assert_eq!(
            remote.calls(),
            vec![
                Call::List("a.txt".to_string()),
                Call::List("b.txt".to_string())
            ]
        );
    }

    #[test]
    fn test_other_errors_propagate() {
        let remote = MemoryRemote::new();
        remote.add_file("a.txt", b"a");
        remote.fail_on(Op::List, "a.txt");
        let mut ch = channel(&remote);

        let units = vec![TransferUnit::remote("a.txt")];
        let err = run(ch.as_mut(), &units, &StopSignal::new()).unwrap_err();
        assert!(!err.is_not_found());
    }
}
