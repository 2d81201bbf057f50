//! Guest memory bus: main RAM with its mirrors, the hardware register
//! window and the gather pipe.
//!
//! Only RAM is visible to fast accesses. Hardware registers answer the
//! checked accessors alone, so a fast access to them always faults.

use gekko_core::{AccessSize, GuestMemory, MemoryFault, GATHER_PIPE_ADDRESS, GATHER_PIPE_BURST};

pub const DEFAULT_RAM_SIZE: usize = 24 * 1024 * 1024;

/// Bases at which main RAM is visible: physical, cached and uncached.
pub const RAM_MIRRORS: [u32; 3] = [0x0000_0000, 0x8000_0000, 0xC000_0000];

/// Memory-mapped hardware registers.
pub const HW_REGS_BASE: u32 = 0xCC00_0000;
pub const HW_REGS_SIZE: usize = 0x1_0000;

/// Write-gather queue in front of the graphics FIFO.
///
/// Writes accumulate until a flush moves every complete burst into the
/// FIFO. Crossing the FIFO watermark latches an interrupt request.
#[derive(Debug, Default)]
pub struct GatherPipe {
    pending: Vec<u8>,
    fifo: Vec<u8>,
    watermark: Option<usize>,
    interrupt: bool,
}

impl GatherPipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, size: AccessSize, value: u64) {
        let bytes = value.to_be_bytes();
        let n = size.bytes() as usize;
        self.pending.extend_from_slice(&bytes[8 - n..]);
    }

    /// Move complete bursts into the FIFO. Returns the bytes moved.
    pub fn flush(&mut self) -> usize {
        let moved = self.pending.len() / GATHER_PIPE_BURST * GATHER_PIPE_BURST;
        if moved == 0 {
            return 0;
        }
        let before = self.fifo.len();
        self.fifo.extend(self.pending.drain(..moved));
        if let Some(mark) = self.watermark {
            if before < mark && self.fifo.len() >= mark {
                self.interrupt = true;
            }
        }
        moved
    }

    /// Raise an interrupt once the FIFO holds `bytes` or more.
    pub fn set_watermark(&mut self, bytes: Option<usize>) {
        self.watermark = bytes;
    }

    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn fifo(&self) -> &[u8] {
        &self.fifo
    }

    pub fn take_fifo(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.fifo)
    }
}

pub struct Memory {
    ram: Vec<u8>,
    hw_regs: Vec<u8>,
    pub gather_pipe: GatherPipe,
}

impl Memory {
    pub fn new(ram_size: usize) -> Self {
        Self {
            ram: vec![0; ram_size],
            hw_regs: vec![0; HW_REGS_SIZE],
            gather_pipe: GatherPipe::new(),
        }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    /// Raw big-endian contents of the hardware register window.
    pub fn hw_regs(&self) -> &[u8] {
        &self.hw_regs
    }

    pub fn hw_regs_mut(&mut self) -> &mut [u8] {
        &mut self.hw_regs
    }

    /// Offset into RAM of `len` bytes at `addr`, through any mirror.
    fn ram_offset(&self, addr: u32, len: usize) -> Option<usize> {
        RAM_MIRRORS.iter().find_map(|&base| {
            let offset = addr.wrapping_sub(base) as usize;
            (offset + len <= self.ram.len()).then_some(offset)
        })
    }

    /// Host bytes behind a guest range, for fast accesses.
    pub fn fastmem(&mut self, addr: u32, len: usize) -> Option<&mut [u8]> {
        let offset = self.ram_offset(addr, len)?;
        Some(&mut self.ram[offset..offset + len])
    }

    /// Copy `bytes` into RAM at `addr`.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) -> Result<(), MemoryFault> {
        let offset = self.ram_offset(addr, bytes.len()).ok_or(MemoryFault {
            address: addr,
            is_store: true,
        })?;
        self.ram[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Store big-endian instruction words starting at `addr`.
    pub fn load_words(&mut self, addr: u32, words: &[u32]) -> Result<(), MemoryFault> {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        self.load(addr, &bytes)
    }

    fn hw_offset(addr: u32, len: usize) -> Option<usize> {
        let offset = addr.wrapping_sub(HW_REGS_BASE) as usize;
        (offset + len <= HW_REGS_SIZE).then_some(offset)
    }

    /// Backing bytes of a checked access.
    fn backing(&mut self, addr: u32, len: usize, is_store: bool) -> Result<&mut [u8], MemoryFault> {
        if let Some(offset) = self.ram_offset(addr, len) {
            return Ok(&mut self.ram[offset..offset + len]);
        }
        match Self::hw_offset(addr, len) {
            Some(offset) => Ok(&mut self.hw_regs[offset..offset + len]),
            None => Err(MemoryFault {
                address: addr,
                is_store,
            }),
        }
    }

    fn read<const N: usize>(&mut self, addr: u32) -> Result<[u8; N], MemoryFault> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.backing(addr, N, false)?);
        Ok(out)
    }

    fn write<const N: usize>(&mut self, bytes: [u8; N], addr: u32) -> Result<(), MemoryFault> {
        if addr == GATHER_PIPE_ADDRESS {
            self.gather_pipe.pending.extend_from_slice(&bytes);
            return Ok(());
        }
        self.backing(addr, N, true)?.copy_from_slice(&bytes);
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_RAM_SIZE)
    }
}

impl GuestMemory for Memory {
    fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryFault> {
        self.read::<1>(addr).map(u8::from_be_bytes)
    }

    fn read_u16(&mut self, addr: u32) -> Result<u16, MemoryFault> {
        self.read::<2>(addr).map(u16::from_be_bytes)
    }

    fn read_u32(&mut self, addr: u32) -> Result<u32, MemoryFault> {
        self.read::<4>(addr).map(u32::from_be_bytes)
    }

    fn read_u64(&mut self, addr: u32) -> Result<u64, MemoryFault> {
        self.read::<8>(addr).map(u64::from_be_bytes)
    }

    fn write_u8(&mut self, value: u8, addr: u32) -> Result<(), MemoryFault> {
        self.write(value.to_be_bytes(), addr)
    }

    fn write_u16(&mut self, value: u16, addr: u32) -> Result<(), MemoryFault> {
        self.write(value.to_be_bytes(), addr)
    }

    fn write_u32(&mut self, value: u32, addr: u32) -> Result<(), MemoryFault> {
        self.write(value.to_be_bytes(), addr)
    }

    fn write_u64(&mut self, value: u64, addr: u32) -> Result<(), MemoryFault> {
        self.write(value.to_be_bytes(), addr)
    }
}
