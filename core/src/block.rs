use std::ops::Range;

/// Index of a block in the block cache.
pub type BlockId = usize;

/// One exit point of a compiled block.
///
/// `patch_site` is the code-buffer offset of the exit's `Jmp`. While the
/// exit is unlinked the jump targets the dispatcher stub; linking rewrites
/// it to the target block's checked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord {
    pub guest_target: u32,
    pub patch_site: usize,
    pub is_linked: bool,
}

/// Whether other blocks may jump into this one directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Allocated, code not finalized yet.
    Pending,
    /// Finalized with linking enabled.
    Linkable,
    /// Finalized with linking disabled; every exit goes through the
    /// dispatcher and nothing links to it.
    Isolated,
}

/// A compiled guest block.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    pub guest_start: u32,
    pub guest_instruction_count: u32,
    /// Guest bytes covered, `4 * guest_instruction_count`.
    pub guest_size: u32,
    /// Entry that first checks the downcount.
    pub checked_entry: usize,
    /// Entry that skips the downcount check.
    pub normal_entry: usize,
    /// End of the block's host code (exclusive).
    pub host_end: usize,
    pub exits: Vec<ExitRecord>,
    pub link_state: LinkState,
}

impl CodeBlock {
    pub fn new(guest_start: u32) -> Self {
        Self {
            guest_start,
            guest_instruction_count: 0,
            guest_size: 0,
            checked_entry: 0,
            normal_entry: 0,
            host_end: 0,
            exits: Vec::new(),
            link_state: LinkState::Pending,
        }
    }

    /// Host code range, checked entry first.
    pub fn host_code_range(&self) -> Range<usize> {
        self.checked_entry..self.host_end
    }

    pub fn contains_guest(&self, addr: u32) -> bool {
        addr.wrapping_sub(self.guest_start) < self.guest_size
    }
}

/// Number of entries in the dispatcher's jump cache.
pub const JMP_CACHE_SIZE: usize = 1 << 12;

/// Direct-mapped cache from guest pc to block id, in front of the
/// dispatcher's address map.
///
/// Entries carry the pc they were filled for, so a colliding pc misses
/// instead of returning another block. The index folds address bits above
/// the table span back in, keeping the cached and uncached mirrors of the
/// same RAM page apart.
pub struct JumpCache {
    entries: Box<[Option<(u32, BlockId)>]>,
}

impl JumpCache {
    pub fn new() -> Self {
        Self {
            entries: vec![None; JMP_CACHE_SIZE].into_boxed_slice(),
        }
    }

    fn slot(pc: u32) -> usize {
        let word = pc >> 2;
        ((word ^ (word >> 12) ^ (pc >> 30)) as usize) & (JMP_CACHE_SIZE - 1)
    }

    pub fn lookup(&self, pc: u32) -> Option<BlockId> {
        match self.entries[Self::slot(pc)] {
            Some((tag, id)) if tag == pc => Some(id),
            _ => None,
        }
    }

    /// Fill the slot for `pc`, evicting whatever shared it.
    pub fn insert(&mut self, pc: u32, id: BlockId) {
        self.entries[Self::slot(pc)] = Some((pc, id));
    }

    pub fn invalidate(&mut self) {
        self.entries.fill(None);
    }
}

impl Default for JumpCache {
    fn default() -> Self {
        Self::new()
    }
}
