//! Live in-process image access.
//!
//! `ProcessImage` reads and patches the memory of the process we are loaded
//! into. This is the only module that touches raw pointers; everything above
//! it works through the [`CodeImage`]/[`PatchCode`] traits.

use super::{CodeAddress, CodeImage, CodeWrite, PatchCode};
use crate::error::{Error, Result};

/// Size of the executable arena backing trampolines.
pub const ARENA_SIZE: usize = 4096;

/// Direct access to our own address space. Addresses come from the scanner
/// or the interface factory, so they are trusted to be mapped; a bad address
/// here is a bug in the caller, not something we can detect portably.
#[derive(Debug, Clone, Copy)]
pub struct ProcessImage;

impl ProcessImage {
    /// # Safety
    ///
    /// All addresses later passed to this image must point into memory the
    /// host program keeps mapped for the lifetime of the plugin.
    pub unsafe fn new() -> Self {
        ProcessImage
    }

    /// Allocate a fresh read/write/execute arena for trampolines.
    ///
    /// PE sections can't be flagged rwx up front, so trampolines get their
    /// own page instead of living in a patched static buffer.
    pub fn alloc_executable_arena(&self) -> Result<CodeAddress> {
        #[cfg(target_os = "windows")]
        {
            use windows::Win32::System::Memory::{
                MEM_COMMIT, MEM_RESERVE, PAGE_EXECUTE_READWRITE, VirtualAlloc,
            };
            // SAFETY: plain anonymous allocation; no aliasing concerns.
            let p = unsafe {
                VirtualAlloc(None, ARENA_SIZE, MEM_COMMIT | MEM_RESERVE, PAGE_EXECUTE_READWRITE)
            };
            if p.is_null() {
                return Err(Error::Unprotect {
                    addr: CodeAddress::new(0),
                    len: ARENA_SIZE,
                });
            }
            Ok(CodeAddress::new(p as u64))
        }
        #[cfg(unix)]
        {
            // SAFETY: anonymous private mapping, never unmapped (trampolines
            // must outlive every hooked call).
            let p = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    ARENA_SIZE,
                    libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if p == libc::MAP_FAILED {
                return Err(Error::Unprotect {
                    addr: CodeAddress::new(0),
                    len: ARENA_SIZE,
                });
            }
            Ok(CodeAddress::new(p as u64))
        }
        #[cfg(not(any(target_os = "windows", unix)))]
        {
            Err(Error::Unprotect {
                addr: CodeAddress::new(0),
                len: ARENA_SIZE,
            })
        }
    }
}

impl CodeImage for ProcessImage {
    fn read_bytes(&self, addr: CodeAddress, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        // SAFETY: per the `new` contract the region is mapped; reads of code
        // the scanner walks are always within the host's executable image.
        unsafe {
            std::ptr::copy_nonoverlapping(addr.value() as *const u8, out.as_mut_ptr(), len);
        }
        Ok(out)
    }
}

impl CodeWrite for ProcessImage {
    fn write_bytes(&self, addr: CodeAddress, bytes: &[u8]) -> Result<()> {
        // SAFETY: targets are either our own arena, data globals owned by
        // the host, or code made writable by `unprotect` first.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr.value() as *mut u8, bytes.len());
        }
        Ok(())
    }
}

impl PatchCode for ProcessImage {
    fn unprotect(&self, addr: CodeAddress, len: usize) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            use windows::Win32::System::Memory::{
                PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS, VirtualProtect,
            };
            let mut old = PAGE_PROTECTION_FLAGS(0);
            // SAFETY: flipping protection on a mapped code page.
            unsafe {
                VirtualProtect(
                    addr.value() as *const _,
                    len,
                    PAGE_EXECUTE_READWRITE,
                    &mut old,
                )
            }
            .map_err(|_| Error::Unprotect { addr, len })
        }
        #[cfg(unix)]
        {
            let page = 4096u64;
            let start = addr.value() & !(page - 1);
            let span = (addr.value() + len as u64 - start).div_ceil(page) * page;
            // SAFETY: page-aligned range covering the patch site.
            let rc = unsafe {
                libc::mprotect(
                    start as *mut libc::c_void,
                    span as usize,
                    libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                )
            };
            if rc != 0 {
                return Err(Error::Unprotect { addr, len });
            }
            Ok(())
        }
        #[cfg(not(any(target_os = "windows", unix)))]
        {
            Err(Error::Unprotect { addr, len })
        }
    }

    fn flush_icache(&self, addr: CodeAddress, len: usize) {
        #[cfg(target_os = "windows")]
        {
            use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
            use windows::Win32::System::Threading::GetCurrentProcess;
            // SAFETY: current-process handle, range we just wrote.
            let _ = unsafe {
                FlushInstructionCache(GetCurrentProcess(), Some(addr.value() as *const _), len)
            };
        }
        #[cfg(not(target_os = "windows"))]
        {
            // x86 keeps the instruction cache coherent with stores; nothing
            // to do beyond what the compiler already guarantees.
            let _ = (addr, len);
        }
    }
}
