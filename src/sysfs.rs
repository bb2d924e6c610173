//! Access to the kernel power management control files under `/sys/power`.
//!
//! Every write is a single unbuffered `write(2)` of a short ASCII token; the
//! kernel accepts or rejects the whole token at once, so a short write is an
//! error. The control directory is a parameter so tests can point it at a
//! temporary directory standing in for sysfs.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Error, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

/// Location of the power management control directory.
pub const POWER_PATH: &str = "/sys/power";

/// Control file selecting the hibernation image target kind.
const DISK_FILE: &str = "disk";
/// Control file triggering the actual transition.
const STATE_FILE: &str = "state";
/// Control file telling the kernel which device to resume from.
const RESUME_FILE: &str = "resume";
/// Control file giving the page offset of the image within the resume device.
const RESUME_OFFSET_FILE: &str = "resume_offset";

/// Handle on the power management control directory.
pub struct PowerFs {
    root: PathBuf,
}

impl PowerFs {
    /// Returns the control directory of the running system.
    pub fn new() -> Self {
        Self::at(POWER_PATH)
    }

    /// Returns a control directory rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the disk mode control file.
    pub fn disk_path(&self) -> PathBuf {
        self.root.join(DISK_FILE)
    }

    /// Path of the power state control file.
    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Path of the resume device control file.
    pub fn resume_path(&self) -> PathBuf {
        self.root.join(RESUME_FILE)
    }

    /// Path of the resume offset control file.
    pub fn resume_offset_path(&self) -> PathBuf {
        self.root.join(RESUME_OFFSET_FILE)
    }

    /// Opens the power state control stream for writing.
    ///
    /// The open is truncation-free and never creates the file: a missing
    /// control file means missing kernel support, not a file to make.
    pub fn open_state(&self) -> io::Result<File> {
        self.open(self.state_path())
    }

    /// Writes a hibernation mode token to the disk mode control file.
    pub fn write_disk_mode(&self, mode: &str) -> io::Result<()> {
        self.write_control(self.disk_path(), mode)
    }

    /// Writes the resume device to the resume control file.
    pub fn write_resume(&self, device: &str) -> io::Result<()> {
        self.write_control(self.resume_path(), device)
    }

    /// Writes the image page offset to the resume offset control file.
    pub fn write_resume_offset(&self, offset: &str) -> io::Result<()> {
        self.write_control(self.resume_offset_path(), offset)
    }

    /// Tells whether the kernel exposes a writable resume offset file.
    ///
    /// The file only exists on 4.17+ kernels; its absence is a supported
    /// degraded mode and reported as `Ok(false)`. Any other probe failure is
    /// an error.
    pub fn resume_offset_supported(&self) -> io::Result<bool> {
        let path = self.resume_offset_path();
        let path_c = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
        let ret = unsafe { libc::access(path_c.as_ptr(), libc::W_OK) };
        if ret == 0 {
            return Ok(true);
        }
        let err = Error::last_os_error();
        if err.kind() == io::ErrorKind::NotFound {
            Ok(false)
        } else {
            Err(err)
        }
    }

    fn open(&self, path: PathBuf) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
    }

    fn write_control(&self, path: PathBuf, token: &str) -> io::Result<()> {
        let mut file = self.open(path)?;
        write_token(&mut file, token)
    }
}

impl Default for PowerFs {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `token` to `file` in a single unbuffered write.
pub fn write_token(file: &mut File, token: &str) -> io::Result<()> {
    let n = file.write(token.as_bytes())?;
    if n != token.len() {
        return Err(Error::new(io::ErrorKind::WriteZero, "short write"));
    }
    Ok(())
}
