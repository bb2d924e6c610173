//! Discovery of the swap space backing hibernation, from `/proc/swaps`.

use crate::error::SleepError;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Where the hibernation image is written and resumed from.
#[derive(Clone, Debug)]
pub struct HibernationLocation {
    /// Path of the backing device or file, as listed by the kernel.
    pub device: String,
    /// Backing type as reported by the kernel: `partition` or `file`.
    pub kind: String,
}

/// Finds the swap space that will back the hibernation image.
///
/// Entries are considered in the kernel's order and the first usable one
/// wins. zram devices are memory backed and cannot hold an image across a
/// power cycle, so they are skipped.
pub fn find_hibernate_location(swaps: &Path) -> Result<HibernationLocation, SleepError> {
    let contents = fs::read_to_string(swaps).map_err(|err| SleepError::io("read", swaps, err))?;

    // First line is the column header.
    for line in contents.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(kind)) = (fields.next(), fields.next()) else {
            continue;
        };
        if device.starts_with("/dev/zram") {
            debug!(device, "skipping zram swap device");
            continue;
        }
        return Ok(HibernationLocation {
            device: device.to_owned(),
            kind: kind.to_owned(),
        });
    }

    Err(SleepError::InvalidHibernationTarget {
        path: swaps.to_owned(),
        reason: "no usable swap space found".to_owned(),
    })
}
