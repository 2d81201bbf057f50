//! Guest memory access interface.

use std::fmt;

/// Write-gather pipe register. Stores here are queued, not memory writes.
pub const GATHER_PIPE_ADDRESS: u32 = 0xCC00_8000;
/// Bytes the gather pipe hands to the FIFO at a time.
pub const GATHER_PIPE_BURST: usize = 32;

/// Failed guest access. The caller turns it into a DSI or ISI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFault {
    pub address: u32,
    pub is_store: bool,
}

impl fmt::Display for MemoryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_store { "write" } else { "read" };
        write!(f, "unmapped {kind} at {:#010x}", self.address)
    }
}

impl std::error::Error for MemoryFault {}

/// Width of a data access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AccessSize {
    U8 = 1,
    U16 = 2,
    U32 = 4,
    U64 = 8,
}

impl AccessSize {
    #[inline]
    pub const fn bytes(self) -> u32 {
        self as u32
    }

    pub const fn from_bytes(n: u8) -> Option<Self> {
        match n {
            1 => Some(AccessSize::U8),
            2 => Some(AccessSize::U16),
            4 => Some(AccessSize::U32),
            8 => Some(AccessSize::U64),
            _ => None,
        }
    }
}

/// Big-endian guest memory with checked accessors.
///
/// Values are numeric: `read_u32` returns the guest word, not its bytes.
pub trait GuestMemory {
    fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryFault>;
    fn read_u16(&mut self, addr: u32) -> Result<u16, MemoryFault>;
    fn read_u32(&mut self, addr: u32) -> Result<u32, MemoryFault>;
    fn read_u64(&mut self, addr: u32) -> Result<u64, MemoryFault>;

    fn write_u8(&mut self, value: u8, addr: u32) -> Result<(), MemoryFault>;
    fn write_u16(&mut self, value: u16, addr: u32) -> Result<(), MemoryFault>;
    fn write_u32(&mut self, value: u32, addr: u32) -> Result<(), MemoryFault>;
    fn write_u64(&mut self, value: u64, addr: u32) -> Result<(), MemoryFault>;

    /// Instruction fetch. Fails on addresses that hold no code.
    fn fetch(&mut self, addr: u32) -> Result<u32, MemoryFault> {
        self.read_u32(addr)
    }

    /// Sized read, zero-extended.
    fn read_sized(&mut self, size: AccessSize, addr: u32) -> Result<u64, MemoryFault> {
        Ok(match size {
            AccessSize::U8 => self.read_u8(addr)? as u64,
            AccessSize::U16 => self.read_u16(addr)? as u64,
            AccessSize::U32 => self.read_u32(addr)? as u64,
            AccessSize::U64 => self.read_u64(addr)?,
        })
    }

    /// Sized write of the low bytes of `value`.
    fn write_sized(&mut self, size: AccessSize, value: u64, addr: u32) -> Result<(), MemoryFault> {
        match size {
            AccessSize::U8 => self.write_u8(value as u8, addr),
            AccessSize::U16 => self.write_u16(value as u16, addr),
            AccessSize::U32 => self.write_u32(value as u32, addr),
            AccessSize::U64 => self.write_u64(value, addr),
        }
    }
}
