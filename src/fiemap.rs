//! Querying a file's physical extent map through the FIEMAP ioctl.

use libc::{c_ulong, ioctl};
use std::fs::File;
use std::io;
use std::io::Error;
use std::mem;
use std::os::fd::AsRawFd;

/// ioctl macro: Command.
macro_rules! ioc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        (($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
    };
}

/// ioctl macro: Read/write command.
macro_rules! iowr {
    ($a:expr, $b:expr, $c:ty) => {
        ioc!(3, $a, $b, mem::size_of::<$c>() as c_ulong)
    };
}

/// ioctl command: Get the extent mapping of a file.
const FS_IOC_FIEMAP: c_ulong = iowr!('f' as c_ulong, 11, Fiemap);

/// Sync the file before mapping, so the map reflects what is on disk.
const FIEMAP_FLAG_SYNC: u32 = 0x1;

/// Header of the FIEMAP ioctl exchange. Layout mirrors the kernel struct.
#[repr(C)]
#[allow(dead_code)]
struct Fiemap {
    fm_start: u64,
    fm_length: u64,
    fm_flags: u32,
    fm_mapped_extents: u32,
    fm_extent_count: u32,
    fm_reserved: u32,
}

/// One extent record, filled in by the kernel. Layout mirrors the kernel
/// struct.
#[repr(C)]
#[allow(dead_code)]
struct FiemapExtent {
    fe_logical: u64,
    fe_physical: u64,
    fe_length: u64,
    fe_reserved64: [u64; 2],
    fe_flags: u32,
    fe_reserved: [u32; 3],
}

/// FIEMAP request with room for a single extent record.
#[repr(C)]
struct FiemapRequest {
    header: Fiemap,
    extents: [FiemapExtent; 1],
}

/// Physical extent mapping summary for a file.
#[derive(Clone, Copy, Debug)]
pub struct ExtentInfo {
    /// Number of extents the filesystem mapped into the request.
    pub mapped_extents: u32,
    first_physical: u64,
}

impl ExtentInfo {
    #[cfg(test)]
    pub(crate) fn synthetic(mapped_extents: u32, first_physical: u64) -> Self {
        Self {
            mapped_extents,
            first_physical,
        }
    }

    /// Physical byte offset of the first mapped extent.
    ///
    /// `None` when the file reports no mapped extents, which happens for
    /// sparse or not yet allocated swap files. Callers must treat that as a
    /// distinct case, not as an offset of zero.
    pub fn first_physical(&self) -> Option<u64> {
        (self.mapped_extents > 0).then_some(self.first_physical)
    }
}

/// Queries the physical extent map of `file`.
///
/// Only one extent record is requested: resuming from a hibernation image
/// needs the start of the image, not the full mapping.
pub fn read_extent_map(file: &File) -> io::Result<ExtentInfo> {
    let mut req: FiemapRequest = unsafe { mem::zeroed() };
    req.header.fm_length = u64::MAX;
    req.header.fm_flags = FIEMAP_FLAG_SYNC;
    req.header.fm_extent_count = 1;

    let ret = unsafe { ioctl(file.as_raw_fd(), FS_IOC_FIEMAP as _, &mut req) };
    if ret < 0 {
        return Err(Error::last_os_error());
    }

    Ok(ExtentInfo {
        mapped_extents: req.header.fm_mapped_extents,
        first_physical: req.extents[0].fe_physical,
    })
}

/// Size of a system memory page in bytes.
pub fn page_size() -> u64 {
    let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ret <= 0 {
        4096
    } else {
        ret as u64
    }
}
