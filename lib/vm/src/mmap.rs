//! Low-level abstraction for reserving large virtual address ranges and
//! lazily committing zero-filled pages within them.
//!
//! A table's element store is one oversized reservation: the whole range is
//! mapped inaccessible up front, and pages are committed as the table grows.
//! Freshly committed pages are guaranteed zero-filled by the OS.

use more_asserts::assert_le;
use std::io;
use std::ptr;

/// Round `size` up to the nearest multiple of `page_size`.
pub fn round_up_to_page_size(size: usize, page_size: usize) -> usize {
    (size + (page_size - 1)) & !(page_size - 1)
}

/// A page-aligned reservation of virtual address space, of which a
/// page-aligned prefix is committed (accessible and zero-initialized).
#[derive(Debug)]
pub struct Mmap {
    // Note that this is stored as a `usize` instead of a `*const` or `*mut`
    // pointer to allow this structure to be natively `Send` and `Sync` without
    // `unsafe impl`. This type is sendable across threads and shareable since
    // the coordination all happens at the OS layer.
    ptr: usize,
    total_size: usize,
    accessible_size: usize,
}

impl Mmap {
    /// Construct a new empty instance of `Mmap`.
    pub fn new() -> Self {
        // Rust's slices require non-null pointers, even when empty. `Vec`
        // contains code to create a non-null dangling pointer value when
        // constructed empty, so we reuse that here.
        let empty = Vec::<u8>::new();
        Self {
            ptr: empty.as_ptr() as usize,
            total_size: 0,
            accessible_size: 0,
        }
    }

    /// Reserve `mapping_size` bytes of address space with no accessible
    /// pages. `mapping_size` must be a native page-size multiple.
    pub fn reserved(mapping_size: usize) -> Result<Self, String> {
        Self::accessible_reserved(0, mapping_size)
    }

    /// Create a new `Mmap` pointing to `accessible_size` bytes of page-aligned
    /// accessible memory, within a reserved mapping of `mapping_size` bytes.
    /// `accessible_size` and `mapping_size` must be native page-size multiples.
    #[cfg(not(target_os = "windows"))]
    pub fn accessible_reserved(
        accessible_size: usize,
        mapping_size: usize,
    ) -> Result<Self, String> {
        let page_size = region::page::size();
        assert_le!(accessible_size, mapping_size);
        assert_eq!(mapping_size & (page_size - 1), 0);
        assert_eq!(accessible_size & (page_size - 1), 0);

        // Mmap may return EINVAL if the size is zero, so just special-case
        // that.
        if mapping_size == 0 {
            return Ok(Self::new());
        }

        // Reserve the mapping size.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapping_size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if ptr as isize == -1_isize {
            return Err(io::Error::last_os_error().to_string());
        }

        let mut result = Self {
            ptr: ptr as usize,
            total_size: mapping_size,
            accessible_size: 0,
        };

        if accessible_size != 0 {
            // Commit the accessible size.
            result.make_accessible(0, accessible_size)?;
        }

        Ok(result)
    }

    /// Create a new `Mmap` pointing to `accessible_size` bytes of page-aligned
    /// accessible memory, within a reserved mapping of `mapping_size` bytes.
    /// `accessible_size` and `mapping_size` must be native page-size multiples.
    #[cfg(target_os = "windows")]
    pub fn accessible_reserved(
        accessible_size: usize,
        mapping_size: usize,
    ) -> Result<Self, String> {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_RESERVE, PAGE_NOACCESS};

        let page_size = region::page::size();
        assert_le!(accessible_size, mapping_size);
        assert_eq!(mapping_size & (page_size - 1), 0);
        assert_eq!(accessible_size & (page_size - 1), 0);

        // VirtualAlloc may return ERROR_INVALID_PARAMETER if the size is zero,
        // so just special-case that.
        if mapping_size == 0 {
            return Ok(Self::new());
        }

        // Reserve the mapping size.
        let ptr = unsafe { VirtualAlloc(ptr::null_mut(), mapping_size, MEM_RESERVE, PAGE_NOACCESS) };
        if ptr.is_null() {
            return Err(io::Error::last_os_error().to_string());
        }

        let mut result = Self {
            ptr: ptr as usize,
            total_size: mapping_size,
            accessible_size: 0,
        };

        if accessible_size != 0 {
            // Commit the accessible size.
            result.make_accessible(0, accessible_size)?;
        }

        Ok(result)
    }

    /// Commit the pages starting at `start` and extending for `len` bytes,
    /// making them readable and writable. `start` and `len` must be native
    /// page-size multiples and describe a range within `self`'s reserved
    /// memory. Idempotent on already-committed ranges.
    #[cfg(not(target_os = "windows"))]
    pub fn make_accessible(&mut self, start: usize, len: usize) -> Result<(), String> {
        let page_size = region::page::size();
        assert_eq!(start & (page_size - 1), 0);
        assert_eq!(len & (page_size - 1), 0);
        assert_le!(len, self.total_size);
        assert_le!(start, self.total_size - len);

        // Commit the accessible size.
        let ptr = self.ptr as *const u8;
        unsafe { region::protect(ptr.add(start), len, region::Protection::READ_WRITE) }
            .map_err(|e| e.to_string())?;

        self.accessible_size = usize::max(self.accessible_size, start + len);
        Ok(())
    }

    /// Commit the pages starting at `start` and extending for `len` bytes,
    /// making them readable and writable. `start` and `len` must be native
    /// page-size multiples and describe a range within `self`'s reserved
    /// memory. Idempotent on already-committed ranges.
    #[cfg(target_os = "windows")]
    pub fn make_accessible(&mut self, start: usize, len: usize) -> Result<(), String> {
        use winapi::ctypes::c_void;
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, PAGE_READWRITE};

        let page_size = region::page::size();
        assert_eq!(start & (page_size - 1), 0);
        assert_eq!(len & (page_size - 1), 0);
        assert_le!(len, self.total_size);
        assert_le!(start, self.total_size - len);

        // Commit the accessible size.
        let ptr = self.ptr as *const u8;
        if unsafe {
            VirtualAlloc(
                ptr.add(start) as *mut c_void,
                len,
                MEM_COMMIT,
                PAGE_READWRITE,
            )
        }
        .is_null()
        {
            return Err(io::Error::last_os_error().to_string());
        }

        self.accessible_size = usize::max(self.accessible_size, start + len);
        Ok(())
    }

    /// Decommit the pages starting at `start` and extending for `len` bytes,
    /// returning their physical backing to the OS while keeping the address
    /// range reserved.
    #[cfg(not(target_os = "windows"))]
    pub fn decommit(&mut self, start: usize, len: usize) -> Result<(), String> {
        let page_size = region::page::size();
        assert_eq!(start & (page_size - 1), 0);
        assert_eq!(len & (page_size - 1), 0);
        assert_le!(len, self.total_size);
        assert_le!(start, self.total_size - len);

        let ptr = self.ptr as *const u8;
        unsafe {
            if libc::madvise(ptr.add(start) as *mut libc::c_void, len, libc::MADV_DONTNEED) != 0 {
                return Err(io::Error::last_os_error().to_string());
            }
            region::protect(ptr.add(start), len, region::Protection::NONE)
        }
        .map_err(|e| e.to_string())?;

        self.accessible_size = usize::min(self.accessible_size, start);
        Ok(())
    }

    /// Decommit the pages starting at `start` and extending for `len` bytes,
    /// returning their physical backing to the OS while keeping the address
    /// range reserved.
    #[cfg(target_os = "windows")]
    pub fn decommit(&mut self, start: usize, len: usize) -> Result<(), String> {
        use winapi::ctypes::c_void;
        use winapi::um::memoryapi::VirtualFree;
        use winapi::um::winnt::MEM_DECOMMIT;

        let page_size = region::page::size();
        assert_eq!(start & (page_size - 1), 0);
        assert_eq!(len & (page_size - 1), 0);
        assert_le!(len, self.total_size);
        assert_le!(start, self.total_size - len);

        let ptr = self.ptr as *const u8;
        if unsafe { VirtualFree(ptr.add(start) as *mut c_void, len, MEM_DECOMMIT) } == 0 {
            return Err(io::Error::last_os_error().to_string());
        }

        self.accessible_size = usize::min(self.accessible_size, start);
        Ok(())
    }

    /// Return the reserved memory as a pointer to u8.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// Return the reserved memory as a mutable pointer to u8.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr as *mut u8
    }

    /// Return the length of the reservation, including uncommitted pages.
    pub fn len(&self) -> usize {
        self.total_size
    }

    /// Return the length of the committed prefix.
    pub fn accessible_len(&self) -> usize {
        self.accessible_size
    }

    /// Return whether any memory has been reserved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Mmap {
    #[cfg(not(target_os = "windows"))]
    fn drop(&mut self) {
        if self.total_size != 0 {
            let r = unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.total_size) };
            assert_eq!(r, 0, "munmap failed: {}", io::Error::last_os_error());
        }
    }

    #[cfg(target_os = "windows")]
    fn drop(&mut self) {
        if self.len() != 0 {
            use winapi::ctypes::c_void;
            use winapi::um::memoryapi::VirtualFree;
            use winapi::um::winnt::MEM_RELEASE;
            let r = unsafe { VirtualFree(self.ptr as *mut c_void, 0, MEM_RELEASE) };
            assert_ne!(r, 0);
        }
    }
}

fn _assert() {
    fn _assert_send_sync<T: Send + Sync>() {}
    _assert_send_sync::<Mmap>();
}
