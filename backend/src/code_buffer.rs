//! Memory holding generated host code.
//!
//! One anonymous mapping split in two regions. Blocks are appended to the
//! code region at the write cursor and the whole region is thrown away
//! when the block cache is cleared. The trampoline region at the tail
//! receives fault trampolines through [`CodeBuffer::emit_at`]; its
//! allocation is tracked by the fault engine.

use std::io;
use std::ops::Range;
use std::ptr;

pub struct CodeBuffer {
    ptr: *mut u8,
    size: usize,
    /// Write cursor.
    offset: usize,
    /// First byte of the trampoline region.
    code_limit: usize,
}

// SAFETY: CodeBuffer owns its mapping exclusively.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// A buffer of at least `size` bytes with no trampoline region.
    pub fn new(size: usize) -> io::Result<Self> {
        Self::with_trampolines(size, 0)
    }

    /// A buffer of at least `size` bytes whose last `trampoline_size`
    /// bytes are reserved for trampolines. Both are rounded to pages.
    pub fn with_trampolines(size: usize, trampoline_size: usize) -> io::Result<Self> {
        let page = page_size();
        let size = round_to_page(size.max(1), page);
        let reserved = round_to_page(trampoline_size, page).min(size);

        // SAFETY: anonymous private mapping, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size,
            offset: 0,
            code_limit: size - reserved,
        })
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// End of the code region.
    #[inline]
    pub fn code_limit(&self) -> usize {
        self.code_limit
    }

    pub fn trampoline_region(&self) -> Range<usize> {
        self.code_limit..self.size
    }

    /// Bytes left in the code region.
    #[inline]
    pub fn code_room(&self) -> usize {
        self.code_limit.saturating_sub(self.offset)
    }

    /// Move the cursor back to `offset` in the code region, dropping what
    /// was emitted after it.
    pub fn rewind(&mut self, offset: usize) {
        assert!(offset <= self.code_limit, "rewind past the code region");
        self.offset = offset;
    }

    /// Run `f` with the cursor at `at`, then restore it. Returns `f`'s
    /// result and the offset `f` stopped at.
    pub fn emit_at<R>(&mut self, at: usize, f: impl FnOnce(&mut Self) -> R) -> (R, usize) {
        assert!(at <= self.size);
        let saved = std::mem::replace(&mut self.offset, at);
        let result = f(self);
        let end = std::mem::replace(&mut self.offset, saved);
        (result, end)
    }

    // -- Emit --

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        self.emit(&[val]);
    }

    #[inline]
    pub fn emit(&mut self, bytes: &[u8]) {
        assert!(self.offset + bytes.len() <= self.size, "code buffer overflow");
        // SAFETY: bounds checked above.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(self.offset), bytes.len());
        }
        self.offset += bytes.len();
    }

    // -- Patch --

    /// Overwrite already emitted bytes without moving the cursor.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.size);
        // SAFETY: bounds checked above.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len()) };
    }

    /// Rewrite a little-endian jump target.
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        self.patch(offset, &val.to_le_bytes());
    }

    /// Overwrite `len` bytes starting at `offset` with `byte`.
    pub fn fill(&mut self, offset: usize, len: usize, byte: u8) {
        assert!(offset + len <= self.size);
        // SAFETY: bounds checked above.
        unsafe { ptr::write_bytes(self.ptr.add(offset), byte, len) };
    }

    // -- Read --

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.range(offset, offset + 1)[0]
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let b = self.range(offset, offset + 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Bytes from `offset` to the end of the mapping, written or not.
    pub fn tail(&self, offset: usize) -> &[u8] {
        self.range(offset, self.size)
    }

    /// Bytes in `start..end`.
    pub fn range(&self, start: usize, end: usize) -> &[u8] {
        assert!(start <= end && end <= self.size);
        // SAFETY: the whole mapping is readable and zero-initialized.
        unsafe { std::slice::from_raw_parts(self.ptr.add(start), end - start) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/size describe the mapping created in `with_trampolines`.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
        }
    }
}

fn round_to_page(n: usize, page: usize) -> usize {
    n.div_ceil(page) * page
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
