/// Translator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitConfig {
    /// Upper bound on guest instructions per block.
    pub max_block_instructions: usize,
    /// How many instructions ahead the allocator looks for the next use.
    pub lookahead_window: usize,
    pub enable_block_linking: bool,
    /// Check the DSI flag after every load/store.
    pub enable_memcheck: bool,
    /// Emit unguarded fast-path accesses repaired by backpatching.
    pub enable_fastmem: bool,
    /// Emit breakpoint checks.
    pub enable_debugging: bool,
    /// One instruction per block.
    pub single_step: bool,
    /// Gather pipe bytes written before a flush call is emitted.
    pub gather_pipe_threshold: u32,
    pub code_buffer_size: usize,
    /// Tail of the code buffer reserved for backpatch trampolines.
    pub trampoline_region_size: usize,
    /// Clear the cache when less than this much block space remains.
    pub min_code_space: usize,
    /// Cycles per dispatcher timeslice.
    pub timeslice_cycles: i32,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            max_block_instructions: 256,
            lookahead_window: 8,
            enable_block_linking: true,
            enable_memcheck: false,
            enable_fastmem: true,
            enable_debugging: false,
            single_step: false,
            gather_pipe_threshold: 32,
            code_buffer_size: 8 * 1024 * 1024,
            trampoline_region_size: 1024 * 1024,
            min_code_space: 64 * 1024,
            timeslice_cycles: 20_000,
        }
    }
}

impl JitConfig {
    pub fn with_max_block_instructions(mut self, n: usize) -> Self {
        self.max_block_instructions = n.max(1);
        self
    }

    pub fn with_lookahead_window(mut self, n: usize) -> Self {
        self.lookahead_window = n;
        self
    }

    pub fn with_block_linking(mut self, on: bool) -> Self {
        self.enable_block_linking = on;
        self
    }

    pub fn with_memcheck(mut self, on: bool) -> Self {
        self.enable_memcheck = on;
        self
    }

    pub fn with_fastmem(mut self, on: bool) -> Self {
        self.enable_fastmem = on;
        self
    }

    pub fn with_debugging(mut self, on: bool) -> Self {
        self.enable_debugging = on;
        self
    }

    pub fn with_single_step(mut self, on: bool) -> Self {
        self.single_step = on;
        self
    }

    pub fn with_gather_pipe_threshold(mut self, bytes: u32) -> Self {
        self.gather_pipe_threshold = bytes;
        self
    }

    pub fn with_code_buffer_size(mut self, bytes: usize) -> Self {
        self.code_buffer_size = bytes;
        self
    }

    pub fn with_trampoline_region_size(mut self, bytes: usize) -> Self {
        self.trampoline_region_size = bytes;
        self
    }

    pub fn with_min_code_space(mut self, bytes: usize) -> Self {
        self.min_code_space = bytes;
        self
    }

    pub fn with_timeslice_cycles(mut self, cycles: i32) -> Self {
        self.timeslice_cycles = cycles.max(1);
        self
    }

    /// Effective block length limit.
    pub fn block_limit(&self) -> usize {
        if self.single_step {
            1
        } else {
            self.max_block_instructions
        }
    }
}
