//! Executable memory for generated code: mapped writable, filled once, then flipped to
//! read+execute and never written again.

use crate::error::{Result, SpecializeError};
use std::ptr::NonNull;

/// Raw signature of every generated function: `(v, w, rows, cols, vals)`.
#[cfg(target_arch = "x86_64")]
pub type MultByMFn =
    unsafe extern "sysv64" fn(*const f64, *mut f64, *const i32, *const i32, *const f64);

#[cfg(not(target_arch = "x86_64"))]
pub type MultByMFn = unsafe extern "C" fn(*const f64, *mut f64, *const i32, *const i32, *const f64);

/// One stripe's finalized machine code, unmapped on drop.
pub struct ExecutableMemory {
    ptr: NonNull<u8>,
    len: usize,
    mapped: usize,
}

// SAFETY: the mapping is read-only after construction and owned exclusively.
unsafe impl Send for ExecutableMemory {}
unsafe impl Sync for ExecutableMemory {}

impl std::fmt::Debug for ExecutableMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableMemory")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("mapped", &self.mapped)
            .finish()
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(sz).ok().filter(|&p| p > 0).unwrap_or(4096)
}

impl ExecutableMemory {
    /// Copy `code` into a fresh mapping and make it executable.
    #[cfg(unix)]
    pub fn new(code: &[u8]) -> Result<Self> {
        let page = page_size();
        let mapped = code.len().max(1).div_ceil(page) * page;

        // SAFETY: anonymous private mapping, no aliasing with existing memory.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(SpecializeError::JitAlloc {
                size: mapped,
                source: std::io::Error::last_os_error(),
            });
        }
        let Some(ptr) = NonNull::new(raw.cast::<u8>()) else {
            return Err(SpecializeError::JitAlloc {
                size: mapped,
                source: std::io::Error::other("mmap returned null"),
            });
        };
        // Dropping `mem` on any error below unmaps the pages.
        let mem = Self { ptr, len: code.len(), mapped };

        // SAFETY: the mapping is at least `code.len()` bytes and writable.
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), mem.ptr.as_ptr(), code.len());
        }
        // SAFETY: same range as the mmap above.
        let rc = unsafe {
            libc::mprotect(mem.ptr.as_ptr().cast(), mapped, libc::PROT_READ | libc::PROT_EXEC)
        };
        if rc != 0 {
            return Err(SpecializeError::JitProtect {
                size: mapped,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(mem)
    }

    #[cfg(not(unix))]
    pub fn new(_code: &[u8]) -> Result<Self> {
        Err(SpecializeError::UnsupportedTarget(std::env::consts::OS))
    }

    /// Code length in bytes (without page padding).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The finalized code, e.g. for dumping to disk.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the mapping stays readable and unmodified until drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Entry point of the generated function.
    ///
    /// # Safety
    /// The bytes must have been produced by the native backend from a well-formed
    /// program, and the returned pointer must not be called after `self` is dropped.
    #[must_use]
    pub unsafe fn entry(&self) -> MultByMFn {
        // SAFETY: upheld by the caller.
        unsafe { std::mem::transmute::<*const u8, MultByMFn>(self.ptr.as_ptr().cast_const()) }
    }
}

impl Drop for ExecutableMemory {
    #[cfg(unix)]
    fn drop(&mut self) {
        // SAFETY: `ptr`/`mapped` describe exactly the mapping created in `new`.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.mapped);
        }
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {}
}
