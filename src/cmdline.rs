//! Kernel command line parsing for resume parameters.

use crate::error::SleepError;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Returns the `resume_offset=` override from the kernel command line.
///
/// The value is kept as the raw string the operator supplied and later
/// written back to the kernel verbatim, not reparsed as an integer. A bare
/// `resume_offset` with no value is a warning, not an error. When the key
/// appears several times the last one wins.
pub fn resume_offset(cmdline: &Path) -> Result<Option<String>, SleepError> {
    let contents =
        fs::read_to_string(cmdline).map_err(|err| SleepError::io("read", cmdline, err))?;

    let mut offset = None;
    for word in contents.split_whitespace() {
        if let Some(value) = word.strip_prefix("resume_offset=") {
            debug!(value, "\"resume_offset\" set on kernel command line");
            offset = Some(value.to_owned());
        } else if word == "resume_offset" {
            warn!("\"resume_offset\" kernel command line option has no value, ignoring");
        }
    }
    Ok(offset)
}
