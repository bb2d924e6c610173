//! Writing the kernel resume target: which device holds the hibernation
//! image and, for file backed swap, at which page offset it starts.

use crate::cmdline;
use crate::error::SleepError;
use crate::fiemap::{self, ExtentInfo};
use crate::swap::HibernationLocation;
use crate::sysfs::PowerFs;
use std::fs::OpenOptions;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::debug;

/// Points the kernel at the hibernation image location.
///
/// Partition backed swap only needs the device path written to the resume
/// control file. File backed swap needs the owning device and the image's
/// page offset within it, computed from the file's first physical extent
/// unless a `resume_offset=` override is present on the kernel command line
/// at `cmdline`. The command line is only consulted on the file backed
/// path, so a partition target never depends on it being readable.
pub fn configure_hibernation_target(
    power: &PowerFs,
    location: &HibernationLocation,
    cmdline: &Path,
) -> Result<(), SleepError> {
    match location.kind.as_str() {
        "partition" => {
            power
                .write_resume(&location.device)
                .map_err(|err| SleepError::io("write", power.resume_path(), err))?;
            Ok(())
        }
        "file" => configure_file_target(power, location, cmdline),
        other => Err(SleepError::InvalidConfiguration(format!(
            "unknown hibernation backing type `{other}` for `{}`",
            location.device
        ))),
    }
}

fn configure_file_target(
    power: &PowerFs,
    location: &HibernationLocation,
    cmdline: &Path,
) -> Result<(), SleepError> {
    let supported = power
        .resume_offset_supported()
        .map_err(|err| SleepError::io("probe", power.resume_offset_path(), err))?;
    if !supported {
        debug!("kernel too old for resume_offset, not configuring hibernation target");
        return Ok(());
    }

    let offset_override = cmdline::resume_offset(cmdline)?;
    let path = Path::new(&location.device);
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_CLOEXEC | libc::O_NONBLOCK)
        .open(path)
        .map_err(|err| SleepError::io("open", path, err))?;
    let metadata = file
        .metadata()
        .map_err(|err| SleepError::io("stat", path, err))?;
    let extents = fiemap::read_extent_map(&file)
        .map_err(|err| SleepError::io("read extent map of", path, err))?;

    write_file_target(
        power,
        metadata.dev(),
        &extents,
        fiemap::page_size(),
        offset_override.as_deref(),
        path,
    )
}

/// Writes the offset and device entries for a file backed image.
///
/// Split from [`configure_hibernation_target`] so the write logic can be
/// exercised with synthetic extent data. The offset is written first; a
/// failure of the later device write is reported as is, with no rollback,
/// since the kernel reads each value independently.
fn write_file_target(
    power: &PowerFs,
    st_dev: u64,
    extents: &ExtentInfo,
    page_size: u64,
    offset_override: Option<&str>,
    path: &Path,
) -> Result<(), SleepError> {
    let Some(first_physical) = extents.first_physical() else {
        return Err(SleepError::InvalidHibernationTarget {
            path: path.to_owned(),
            reason: "no extents mapped, cannot resume from this file".to_owned(),
        });
    };

    let offset = match offset_override {
        // Keep whatever textual form was given on the kernel command line.
        Some(value) => value.to_owned(),
        None => (first_physical / page_size).to_string(),
    };

    let device = format!("{st_dev:x}");
    power
        .write_resume_offset(&offset)
        .map_err(|err| SleepError::io("write", power.resume_offset_path(), err))?;
    power
        .write_resume(&device)
        .map_err(|err| SleepError::io("write", power.resume_path(), err))?;

    debug!(offset = %offset, device = %device, "hibernation target configured");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn fake_power_dir(files: &[&str]) -> (tempfile::TempDir, PowerFs) {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let power = PowerFs::at(dir.path());
        (dir, power)
    }

    fn file_location() -> HibernationLocation {
        HibernationLocation {
            device: "/swapfile".to_owned(),
            kind: "file".to_owned(),
        }
    }

    const NO_CMDLINE: &str = "/nonexistent/cmdline";

    #[test]
    fn partition_device_is_written_verbatim_with_no_offset() {
        let (dir, power) = fake_power_dir(&["resume", "resume_offset"]);
        let location = HibernationLocation {
            device: "/dev/sda2".to_owned(),
            kind: "partition".to_owned(),
        };

        // The unreadable command line must not matter for a partition
        // target: the offset override only applies to file backed swap.
        configure_hibernation_target(&power, &location, Path::new(NO_CMDLINE)).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("resume")).unwrap(),
            "/dev/sda2"
        );
        assert_eq!(fs::read_to_string(dir.path().join("resume_offset")).unwrap(), "");
    }

    #[test]
    fn unknown_backing_type_is_fatal() {
        let (_dir, power) = fake_power_dir(&["resume", "resume_offset"]);
        let location = HibernationLocation {
            device: "/dev/sda2".to_owned(),
            kind: "network".to_owned(),
        };
        let err =
            configure_hibernation_target(&power, &location, Path::new(NO_CMDLINE)).unwrap_err();
        assert!(matches!(err, SleepError::InvalidConfiguration(_)));
    }

    #[test]
    fn missing_offset_support_is_a_silent_success() {
        // No resume_offset file: kernel too old. Nothing is written, the
        // command line is never read and the swap file is never opened.
        let (dir, power) = fake_power_dir(&["resume"]);
        configure_hibernation_target(&power, &file_location(), Path::new(NO_CMDLINE)).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("resume")).unwrap(), "");
    }

    #[test]
    fn zero_extents_fail_without_sysfs_writes() {
        let (dir, power) = fake_power_dir(&["resume", "resume_offset"]);
        let extents = ExtentInfo::synthetic(0, 0);

        let err = write_file_target(&power, 0x803, &extents, 4096, None, Path::new("/swapfile"))
            .unwrap_err();

        assert!(matches!(err, SleepError::InvalidHibernationTarget { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("resume")).unwrap(), "");
        assert_eq!(fs::read_to_string(dir.path().join("resume_offset")).unwrap(), "");
    }

    #[test]
    fn offset_is_first_extent_in_pages_and_device_is_hex() {
        let (dir, power) = fake_power_dir(&["resume", "resume_offset"]);
        let extents = ExtentInfo::synthetic(3, 266338304);

        write_file_target(&power, 0x803, &extents, 4096, None, Path::new("/swapfile")).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("resume_offset")).unwrap(),
            (266338304u64 / 4096).to_string()
        );
        assert_eq!(fs::read_to_string(dir.path().join("resume")).unwrap(), "803");
    }

    #[test]
    fn command_line_override_is_written_verbatim() {
        let (dir, power) = fake_power_dir(&["resume", "resume_offset"]);
        let extents = ExtentInfo::synthetic(3, 266338304);

        write_file_target(
            &power,
            0x803,
            &extents,
            4096,
            Some("12345"),
            Path::new("/swapfile"),
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("resume_offset")).unwrap(),
            "12345"
        );
    }
}
