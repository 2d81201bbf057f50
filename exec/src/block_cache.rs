//! Compiled block storage, lookup and direct linking.
//!
//! Blocks are only ever removed all at once by [`BlockCache::clear`]; a
//! partial eviction would have to unlink every exit pointing into the
//! evicted code.

use std::collections::HashMap;

use gekko_backend::{CodeBuffer, HostCodeGen, VmCodeGen};
use gekko_core::{BlockId, CodeBlock, JumpCache, LinkState};
use gekko_frontend::BlockReport;
use tracing::{debug, info};

pub struct BlockCache {
    blocks: Vec<CodeBlock>,
    by_address: HashMap<u32, BlockId>,
    /// Exits waiting for a block at the keyed guest address, as
    /// `(block, exit index)`.
    pending_links: HashMap<u32, Vec<(BlockId, usize)>>,
    jump_cache: JumpCache,
    links: u64,
}

impl BlockCache {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            by_address: HashMap::new(),
            pending_links: HashMap::new(),
            jump_cache: JumpCache::new(),
            links: 0,
        }
    }

    /// Reserve a block for `guest_address`. It is not visible to
    /// [`lookup`](Self::lookup) until finalized.
    pub fn allocate(&mut self, guest_address: u32) -> BlockId {
        self.blocks.push(CodeBlock::new(guest_address));
        self.blocks.len() - 1
    }

    /// Publish a compiled block and link it both ways: its own exits to
    /// blocks that already exist, and earlier exits waiting for its
    /// address to its checked entry.
    pub fn finalize(
        &mut self,
        buf: &mut CodeBuffer,
        codegen: &VmCodeGen,
        id: BlockId,
        report: &BlockReport,
        allow_linking: bool,
    ) {
        let block = &mut self.blocks[id];
        debug_assert_eq!(block.link_state, LinkState::Pending);
        block.guest_instruction_count = report.instructions;
        block.guest_size = report.guest_size;
        block.checked_entry = report.checked_entry;
        block.normal_entry = report.normal_entry;
        block.host_end = report.host_end;
        block.exits = report.exits.clone();
        block.link_state = if allow_linking {
            LinkState::Linkable
        } else {
            LinkState::Isolated
        };
        let start = block.guest_start;

        if allow_linking {
            for i in 0..self.blocks[id].exits.len() {
                let target = self.blocks[id].exits[i].guest_target;
                match self.linkable(target) {
                    Some(dest) => self.link(buf, codegen, id, i, dest),
                    None => self.pending_links.entry(target).or_default().push((id, i)),
                }
            }
        }

        self.by_address.insert(start, id);
        self.jump_cache.insert(start, id);

        if allow_linking {
            for (src, exit) in self.pending_links.remove(&start).unwrap_or_default() {
                self.link(buf, codegen, src, exit, id);
            }
        }

        let block = &self.blocks[id];
        debug!(
            guest = format_args!("{:#010x}", start),
            instructions = block.guest_instruction_count,
            host_size = block.host_end - block.checked_entry,
            exits = block.exits.len(),
            "block finalized"
        );
    }

    /// Block at `target` that exits may jump into directly.
    fn linkable(&self, target: u32) -> Option<BlockId> {
        let &id = self.by_address.get(&target)?;
        (self.blocks[id].link_state == LinkState::Linkable).then_some(id)
    }

    fn link(&mut self, buf: &mut CodeBuffer, codegen: &VmCodeGen, src: BlockId, exit: usize, dest: BlockId) {
        let entry = self.blocks[dest].checked_entry;
        let record = &mut self.blocks[src].exits[exit];
        if record.is_linked {
            return;
        }
        codegen.patch_jump(buf, record.patch_site, entry);
        record.is_linked = true;
        self.links += 1;
        debug!(
            from = format_args!("{:#010x}", self.blocks[src].guest_start),
            to = format_args!("{:#010x}", self.blocks[dest].guest_start),
            "linked"
        );
    }

    pub fn lookup(&mut self, address: u32) -> Option<BlockId> {
        if let Some(id) = self.jump_cache.lookup(address) {
            return Some(id);
        }
        let id = *self.by_address.get(&address)?;
        self.jump_cache.insert(address, id);
        Some(id)
    }

    pub fn get(&self, id: BlockId) -> &CodeBlock {
        &self.blocks[id]
    }

    /// Finalized blocks.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &CodeBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.link_state != LinkState::Pending)
    }

    /// Number of finalized blocks.
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Exits still waiting for their target to be compiled.
    pub fn pending_exit_count(&self) -> usize {
        self.pending_links.values().map(Vec::len).sum()
    }

    /// Total exits patched since creation.
    pub fn link_count(&self) -> u64 {
        self.links
    }

    /// Drop every block and exit record and rewind the buffer to the start
    /// of generated code.
    pub fn clear(&mut self, buf: &mut CodeBuffer, codegen: &VmCodeGen) {
        info!(blocks = self.by_address.len(), used = buf.offset(), "clearing block cache");
        self.blocks.clear();
        self.by_address.clear();
        self.pending_links.clear();
        self.jump_cache.invalidate();
        buf.rewind(codegen.code_gen_start());
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}
