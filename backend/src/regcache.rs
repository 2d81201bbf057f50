//! Per-block guest register caches.
//!
//! A [`RegCache`] maps the 32 guest registers of one kind onto host
//! registers for the duration of one block. Guest state in [`PpcState`]
//! stays the source of truth: a value is either there (`Memory`), known at
//! compile time (`Immediate`) or held in a host register (`Bound`), and
//! `dirty` says the state copy is stale.
//!
//! [`PpcState`]: gekko_core::PpcState

use std::fmt;
use std::marker::PhantomData;

use gekko_core::{RegSet, StateSlot};

use crate::code_buffer::CodeBuffer;
use crate::vm::emitter::{
    emit_fld_state, emit_fst_state, emit_ld_state, emit_mov_ri, emit_st_state, emit_st_state_imm,
};
use crate::vm::regs::{FReg, Reg, ALLOCATABLE_FPRS, ALLOCATABLE_GPRS, NUM_REGS};

pub const NUM_GUEST_REGS: usize = 32;

/// Where a guest register's current value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location<H> {
    Memory,
    Immediate(u32),
    Bound(H),
}

/// What happens to mappings after a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Write back and keep the host copies valid.
    KeepMapping,
    /// Write back and forget every mapping.
    Discard,
}

/// Look-ahead information used to pick eviction victims.
pub trait UsageHint {
    /// Distance in instructions to the next use of `guest`, or `None` when
    /// it is not used inside the window.
    fn next_use(&self, guest: usize) -> Option<usize>;
}

/// No look-ahead: every register is equally cold.
pub struct NoHint;

impl UsageHint for NoHint {
    fn next_use(&self, _guest: usize) -> Option<usize> {
        None
    }
}

/// A kind of guest register and the host registers that can hold it.
pub trait CacheTarget {
    type Host: Copy + Eq + fmt::Debug + 'static;

    fn allocation_order() -> &'static [Self::Host];
    fn host_index(host: Self::Host) -> usize;
    fn emit_load(buf: &mut CodeBuffer, host: Self::Host, guest: usize);
    fn emit_store(buf: &mut CodeBuffer, host: Self::Host, guest: usize);
    fn emit_store_imm(buf: &mut CodeBuffer, guest: usize, value: u32);
    fn emit_materialize(buf: &mut CodeBuffer, host: Self::Host, guest: usize, value: u32);
}

/// Guest GPRs in `R4..R15`.
pub struct GprTarget;

impl CacheTarget for GprTarget {
    type Host = Reg;

    fn allocation_order() -> &'static [Reg] {
        ALLOCATABLE_GPRS
    }

    fn host_index(host: Reg) -> usize {
        host.index()
    }

    fn emit_load(buf: &mut CodeBuffer, host: Reg, guest: usize) {
        emit_ld_state(buf, host, StateSlot::Gpr(guest as u8));
    }

    fn emit_store(buf: &mut CodeBuffer, host: Reg, guest: usize) {
        emit_st_state(buf, host, StateSlot::Gpr(guest as u8));
    }

    fn emit_store_imm(buf: &mut CodeBuffer, guest: usize, value: u32) {
        emit_st_state_imm(buf, StateSlot::Gpr(guest as u8), value);
    }

    fn emit_materialize(buf: &mut CodeBuffer, host: Reg, _guest: usize, value: u32) {
        emit_mov_ri(buf, host, value);
    }
}

/// Guest FPRs (`ps0` only) in `F2..F15`.
pub struct FprTarget;

impl CacheTarget for FprTarget {
    type Host = FReg;

    fn allocation_order() -> &'static [FReg] {
        ALLOCATABLE_FPRS
    }

    fn host_index(host: FReg) -> usize {
        host.index()
    }

    fn emit_load(buf: &mut CodeBuffer, host: FReg, guest: usize) {
        emit_fld_state(buf, host, StateSlot::Ps0(guest as u8));
    }

    fn emit_store(buf: &mut CodeBuffer, host: FReg, guest: usize) {
        emit_fst_state(buf, host, StateSlot::Ps0(guest as u8));
    }

    fn emit_store_imm(buf: &mut CodeBuffer, guest: usize, value: u32) {
        emit_st_state_imm(buf, StateSlot::Ps0(guest as u8), value);
    }

    fn emit_materialize(buf: &mut CodeBuffer, host: FReg, guest: usize, value: u32) {
        // No float immediates; go through guest state.
        Self::emit_store_imm(buf, guest, value);
        Self::emit_load(buf, host, guest);
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry<H> {
    location: Location<H>,
    dirty: bool,
    locked: bool,
}

impl<H> Entry<H> {
    const EMPTY: Self = Entry {
        location: Location::Memory,
        dirty: false,
        locked: false,
    };
}

pub struct RegCache<T: CacheTarget> {
    entries: [Entry<T::Host>; NUM_GUEST_REGS],
    /// Guest register held by each host register.
    host_owner: [Option<usize>; NUM_REGS],
    /// Host registers released this instruction that must not be reused
    /// before `unlock_all`.
    pinned: RegSet,
    _target: PhantomData<T>,
}

pub type GprCache = RegCache<GprTarget>;
pub type FprCache = RegCache<FprTarget>;

impl<T: CacheTarget> RegCache<T> {
    pub fn new() -> Self {
        Self {
            entries: [Entry::EMPTY; NUM_GUEST_REGS],
            host_owner: [None; NUM_REGS],
            pinned: RegSet::EMPTY,
            _target: PhantomData,
        }
    }

    /// Reset for a new block: every value is in guest state.
    pub fn start(&mut self) {
        *self = Self::new();
    }

    // -- Queries --

    pub fn location(&self, guest: usize) -> Location<T::Host> {
        self.entries[guest].location
    }

    pub fn is_dirty(&self, guest: usize) -> bool {
        self.entries[guest].dirty
    }

    pub fn known_immediate(&self, guest: usize) -> Option<u32> {
        match self.entries[guest].location {
            Location::Immediate(v) => Some(v),
            _ => None,
        }
    }

    pub fn host_of(&self, guest: usize) -> Option<T::Host> {
        match self.entries[guest].location {
            Location::Bound(h) => Some(h),
            _ => None,
        }
    }

    /// Guest registers whose state copy is stale.
    pub fn dirty_set(&self) -> RegSet {
        (0..NUM_GUEST_REGS).filter(|&g| self.entries[g].dirty).collect()
    }

    /// Guest registers currently held in host registers.
    pub fn bound_set(&self) -> RegSet {
        (0..NUM_GUEST_REGS)
            .filter(|&g| matches!(self.entries[g].location, Location::Bound(_)))
            .collect()
    }

    // -- Allocation --

    /// Make `guest` available in a host register, loading it if needed.
    /// The register stays locked until `unlock_all`.
    pub fn acquire(&mut self, buf: &mut CodeBuffer, guest: usize, hint: &dyn UsageHint) -> T::Host {
        let host = match self.entries[guest].location {
            Location::Bound(h) => h,
            Location::Immediate(v) => {
                let h = self.alloc(buf, hint);
                T::emit_materialize(buf, h, guest, v);
                self.bind(guest, h);
                h
            }
            Location::Memory => {
                let h = self.alloc(buf, hint);
                T::emit_load(buf, h, guest);
                self.bind(guest, h);
                h
            }
        };
        self.entries[guest].locked = true;
        host
    }

    /// Bind `guest` to a host register for writing without loading its
    /// old value. Marks it dirty and locked.
    pub fn acquire_for_write(
        &mut self,
        buf: &mut CodeBuffer,
        guest: usize,
        hint: &dyn UsageHint,
    ) -> T::Host {
        let host = match self.entries[guest].location {
            Location::Bound(h) => h,
            Location::Immediate(_) | Location::Memory => {
                let h = self.alloc(buf, hint);
                self.bind(guest, h);
                h
            }
        };
        let e = &mut self.entries[guest];
        e.dirty = true;
        e.locked = true;
        host
    }

    pub fn mark_dirty(&mut self, guest: usize) {
        debug_assert!(
            !matches!(self.entries[guest].location, Location::Memory),
            "marking unmapped register dirty"
        );
        self.entries[guest].dirty = true;
    }

    /// Record a compile-time constant. No host register is used; the value
    /// is written to guest state on the next flush.
    pub fn set_to_known_immediate(&mut self, guest: usize, value: u32) {
        if let Location::Bound(h) = self.entries[guest].location {
            self.host_owner[T::host_index(h)] = None;
            self.pinned = self.pinned.set(T::host_index(h));
        }
        self.entries[guest] = Entry {
            location: Location::Immediate(value),
            dirty: true,
            locked: false,
        };
    }

    /// End of an instruction: everything may be evicted again.
    pub fn unlock_all(&mut self) {
        for e in self.entries.iter_mut() {
            e.locked = false;
        }
        self.pinned = RegSet::EMPTY;
    }

    // -- Write-back --

    /// Write back every dirty register.
    pub fn flush(&mut self, buf: &mut CodeBuffer, mode: FlushMode) {
        for guest in 0..NUM_GUEST_REGS {
            self.flush_reg(buf, guest, mode);
        }
        if mode == FlushMode::Discard {
            self.pinned = RegSet::EMPTY;
        }
    }

    pub fn flush_reg(&mut self, buf: &mut CodeBuffer, guest: usize, mode: FlushMode) {
        self.write_back(buf, guest);
        let e = &mut self.entries[guest];
        e.dirty = false;
        if mode == FlushMode::Discard {
            if let Location::Bound(h) = e.location {
                self.host_owner[T::host_index(h)] = None;
            }
            *e = Entry::EMPTY;
        }
    }

    /// Emit write-backs for every dirty register without touching the
    /// cache state. Used on side exits the fall-through path never sees.
    pub fn write_back_preserving(&self, buf: &mut CodeBuffer) {
        for guest in 0..NUM_GUEST_REGS {
            self.write_back(buf, guest);
        }
    }

    /// Drop mappings for registers not in `in_use`, writing them back first.
    pub fn release_unused(&mut self, buf: &mut CodeBuffer, in_use: RegSet) {
        for guest in 0..NUM_GUEST_REGS {
            let e = &self.entries[guest];
            if in_use.contains(guest) || e.locked || matches!(e.location, Location::Memory) {
                continue;
            }
            self.flush_reg(buf, guest, FlushMode::Discard);
        }
    }

    fn write_back(&self, buf: &mut CodeBuffer, guest: usize) {
        let e = &self.entries[guest];
        if !e.dirty {
            return;
        }
        match e.location {
            Location::Bound(h) => T::emit_store(buf, h, guest),
            Location::Immediate(v) => T::emit_store_imm(buf, guest, v),
            Location::Memory => {}
        }
    }

    // -- Host register management --

    fn bind(&mut self, guest: usize, host: T::Host) {
        self.host_owner[T::host_index(host)] = Some(guest);
        self.entries[guest].location = Location::Bound(host);
    }

    fn alloc(&mut self, buf: &mut CodeBuffer, hint: &dyn UsageHint) -> T::Host {
        let order = T::allocation_order();
        let usable = |h: &T::Host| !self.pinned.contains(T::host_index(*h));

        if let Some(&h) = order
            .iter()
            .filter(|h| usable(h))
            .find(|h| self.host_owner[T::host_index(**h)].is_none())
        {
            return h;
        }

        // Evict the unlocked register whose next use is farthest away.
        // Ties go to the earliest register in allocation order.
        let (_, host, guest) = order
            .iter()
            .enumerate()
            .filter(|(_, h)| usable(h))
            .filter_map(|(i, &h)| self.host_owner[T::host_index(h)].map(|g| (i, h, g)))
            .filter(|&(_, _, g)| !self.entries[g].locked)
            .max_by_key(|&(i, _, g)| (hint.next_use(g).unwrap_or(usize::MAX), std::cmp::Reverse(i)))
            .expect("register cache exhausted");

        tracing::trace!(guest, ?host, "evict");
        self.flush_reg(buf, guest, FlushMode::Discard);
        host
    }
}

impl<T: CacheTarget> Default for RegCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
