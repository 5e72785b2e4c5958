use std::ffi::CString;
use std::io;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicI32, Ordering};

use log::{debug, info, warn};
use serde_derive::{Deserialize, Serialize};

use crate::errors::{Result, ShmemLibError};
use crate::layout::{self, Element, Header, EPSILON, HEADER_SIZE};

pub const DEFAULT_NAME: &str = "/test_shm";
pub const DEFAULT_CAPACITY: i32 = 1 << 15;
pub const DEFAULT_INTERVAL: f64 = 1.0;

const SHM_MODE: libc::mode_t = 0o666;
const NAME_MAX: usize = 255;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmemConfig {
    pub name: String,
    pub capacity: i32,
    pub interval: f64,
}

impl Default for ShmemConfig {
    fn default() -> Self {
        ShmemConfig {
            name: DEFAULT_NAME.to_string(),
            capacity: DEFAULT_CAPACITY,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl ShmemConfig {
    pub fn new(name: impl Into<String>, capacity: i32, interval: f64) -> ShmemConfig {
        ShmemConfig {
            name: name.into(),
            capacity,
            interval,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.capacity < 2 {
            return Err(ShmemLibError::InvalidConfig(format!(
                "capacity must be at least 2, got {}",
                self.capacity
            )));
        }
        if !(self.interval.is_finite() && self.interval > 0.0) {
            return Err(ShmemLibError::InvalidConfig(format!(
                "interval must be a positive finite number, got {}",
                self.interval
            )));
        }
        Ok(())
    }
}

/// Shared-object names are `/` followed by at most 254 bytes without `/` or NUL.
pub fn validate_name(name: &str) -> Result<()> {
    let rest = match name.strip_prefix('/') {
        Some(rest) => rest,
        None => {
            return Err(ShmemLibError::InvalidConfig(format!(
                "region name {:?} must start with '/'",
                name
            )))
        }
    };
    if rest.is_empty() || rest.contains('/') || rest.contains('\0') || name.len() > NAME_MAX {
        return Err(ShmemLibError::InvalidConfig(format!(
            "region name {:?} is not a valid shared memory name",
            name
        )));
    }
    Ok(())
}

fn c_name(name: &str) -> Result<CString> {
    validate_name(name)?;
    CString::new(name).map_err(|e| ShmemLibError::InvalidConfig(e.to_string()))
}

/// One mapping of a named shared region.
///
/// A region returned by [`Region::create`] owns the name: dropping it unmaps
/// the range and unlinks the name. A region returned by [`Region::attach`]
/// only unmaps. Mappings held by other processes stay valid after the unlink.
#[derive(Debug)]
pub struct Region {
    ptr: NonNull<u8>,
    size: usize,
    name: CString,
    owner: bool,
}

// The only word mutated after creation is the atomic count; slot writes are
// confined to the single writer holding `&mut SeriesWriter`.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Creates, sizes, maps and initialises a new region for elements of `T`.
    ///
    /// Fails with `AlreadyExists` and no side effect when the name is taken.
    /// Any partial state (created object, mapping) is rolled back before an
    /// error is returned.
    pub fn create<T: Element>(cfg: &ShmemConfig) -> Result<Region> {
        cfg.validate()?;
        let name = c_name(&cfg.name)?;
        let size = layout::region_size::<T>(cfg.capacity).ok_or_else(|| {
            ShmemLibError::InvalidConfig(format!("capacity {} overflows the region size", cfg.capacity))
        })?;

        let existing = unsafe { libc::shm_open(name.as_ptr(), libc::O_RDONLY, 0) };
        if existing != -1 {
            unsafe { libc::close(existing) };
            return Err(ShmemLibError::AlreadyExists { name: cfg.name.clone() });
        }

        // O_EXCL turns a lost race against another creator into EEXIST.
        let fd = unsafe {
            libc::shm_open(
                name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                SHM_MODE,
            )
        };
        if fd == -1 {
            let source = io::Error::last_os_error();
            if source.raw_os_error() == Some(libc::EEXIST) {
                return Err(ShmemLibError::AlreadyExists { name: cfg.name.clone() });
            }
            return Err(ShmemLibError::CreateFailed { name: cfg.name.clone(), source });
        }

        // shm_open applies the umask.
        if unsafe { libc::fchmod(fd, SHM_MODE) } == -1 {
            warn!(
                "could not set mode {:o} on {}: {}",
                SHM_MODE,
                cfg.name,
                io::Error::last_os_error()
            );
        }

        if unsafe { libc::ftruncate(fd, size as libc::off_t) } == -1 {
            let source = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(name.as_ptr());
            }
            return Err(ShmemLibError::ResizeFailed { name: cfg.name.clone(), size, source });
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            let source = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(name.as_ptr());
            }
            return Err(ShmemLibError::MapFailed { name: cfg.name.clone(), source });
        }
        // The mapping keeps its own reference to the object.
        unsafe { libc::close(fd) };

        let ptr = match NonNull::new(addr as *mut u8) {
            Some(ptr) => ptr,
            None => {
                unsafe { libc::shm_unlink(name.as_ptr()) };
                return Err(ShmemLibError::MapFailed {
                    name: cfg.name.clone(),
                    source: io::Error::new(io::ErrorKind::Other, "mmap returned a null address"),
                });
            }
        };

        unsafe {
            ptr::write(
                ptr.as_ptr() as *mut Header,
                Header {
                    count: AtomicI32::new(0),
                    start_ts: 0.0,
                    interval: cfg.interval,
                    capacity: cfg.capacity,
                },
            );
        }

        info!(
            "created shared memory region {} ({} bytes, capacity {}, interval {})",
            cfg.name, size, cfg.capacity, cfg.interval
        );
        Ok(Region { ptr, size, name, owner: true })
    }

    /// Maps an existing region read-only.
    pub fn attach<T: Element>(name: &str) -> Result<Region> {
        let c_name = c_name(name)?;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd == -1 {
            return Err(ShmemLibError::OpenFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        let mut stat: libc::stat = unsafe { mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut stat) } == -1 {
            let source = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(ShmemLibError::StatFailed { name: name.to_string(), source });
        }
        let size = stat.st_size as usize;
        if size < HEADER_SIZE {
            unsafe { libc::close(fd) };
            return Err(ShmemLibError::LayoutMismatch {
                name: name.to_string(),
                expected: HEADER_SIZE,
                actual: size,
            });
        }

        let addr = unsafe {
            libc::mmap(ptr::null_mut(), size, libc::PROT_READ, libc::MAP_SHARED, fd, 0)
        };
        let map_error = if addr == libc::MAP_FAILED {
            Some(io::Error::last_os_error())
        } else {
            None
        };
        unsafe { libc::close(fd) };
        if let Some(source) = map_error {
            return Err(ShmemLibError::MapFailed { name: name.to_string(), source });
        }
        let ptr = NonNull::new(addr as *mut u8).ok_or_else(|| ShmemLibError::MapFailed {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::Other, "mmap returned a null address"),
        })?;

        // From here on, dropping `region` unmaps.
        let region = Region { ptr, size, name: c_name, owner: false };
        let capacity = region.capacity();
        let expected = if capacity >= 2 {
            layout::region_size::<T>(capacity).unwrap_or(0)
        } else {
            0
        };
        if expected != size {
            return Err(ShmemLibError::LayoutMismatch {
                name: name.to_string(),
                expected,
                actual: size,
            });
        }

        info!("attached to shared memory region {} ({} bytes)", name, size);
        Ok(region)
    }

    /// Unlinks a name left behind by a writer that never dropped its region.
    ///
    /// Returns `false` when nothing by that name exists.
    pub fn remove(name: &str) -> Result<bool> {
        let c_name = c_name(name)?;
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } == -1 {
            let source = io::Error::last_os_error();
            if source.raw_os_error() == Some(libc::ENOENT) {
                return Ok(false);
            }
            return Err(ShmemLibError::UnlinkFailed { name: name.to_string(), source });
        }
        info!("removed shared memory region {}", name);
        Ok(true)
    }

    pub fn name(&self) -> &str {
        self.name.to_str().unwrap_or_default()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    #[inline]
    pub(crate) fn header_ptr(&self) -> *mut Header {
        self.ptr.as_ptr() as *mut Header
    }

    #[inline]
    pub fn header(&self) -> &Header {
        unsafe { &*self.header_ptr() }
    }

    /// Published element count, acquire-loaded.
    #[inline]
    pub fn count(&self) -> i32 {
        self.header().count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn capacity(&self) -> i32 {
        self.header().capacity
    }

    #[inline]
    pub fn interval(&self) -> f64 {
        self.header().interval
    }

    /// Timestamp of slot 0. Only meaningful once `count() > 0`.
    #[inline]
    pub fn start_ts(&self) -> f64 {
        unsafe { ptr::addr_of!((*self.header_ptr()).start_ts).read() }
    }

    #[inline]
    pub(crate) fn slot_ptr<T: Element>(&self, index: usize) -> *mut T {
        unsafe {
            self.ptr
                .as_ptr()
                .add(layout::elements_offset::<T>())
                .cast::<T>()
                .add(index)
        }
    }

    /// Copies slot `index` out, provided it lies below the published count.
    pub fn read<T: Element>(&self, index: i64) -> Result<T> {
        let count = self.count();
        if index < 0 || index >= i64::from(count) {
            return Err(ShmemLibError::OutOfRange { index, count });
        }
        Ok(unsafe { ptr::read(self.slot_ptr::<T>(index as usize)) })
    }

    /// Grid position of `ts`: `floor((ts - start_ts) / interval)`, unbounded.
    ///
    /// A timestamp within `EPSILON` of a grid point maps to that point, the
    /// same tolerance `append` accepts, so rounding in the division cannot
    /// push a grid timestamp into the previous slot.
    pub fn index_of(&self, ts: f64) -> Result<i64> {
        if self.count() == 0 {
            return Err(ShmemLibError::Empty);
        }
        if !ts.is_finite() {
            return Err(ShmemLibError::InvalidTimestamp(ts));
        }
        let start_ts = self.start_ts();
        let interval = self.interval();
        let position = (ts - start_ts) / interval;
        let nearest = position.round();
        let index = if (ts - (start_ts + nearest * interval)).abs() <= EPSILON {
            nearest
        } else {
            position.floor()
        };
        Ok(index as i64)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.size) } == -1 {
            warn!(
                "failed to unmap shared memory region {}: {}",
                self.name(),
                io::Error::last_os_error()
            );
        }
        if !self.owner {
            debug!("detached from shared memory region {}", self.name());
            return;
        }
        if unsafe { libc::shm_unlink(self.name.as_ptr()) } == -1 {
            warn!(
                "failed to unlink shared memory region {}: {}",
                self.name(),
                io::Error::last_os_error()
            );
        } else {
            info!("unlinked shared memory region {}", self.name());
        }
    }
}
