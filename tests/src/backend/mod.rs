mod backpatch;
mod code_buffer;
mod vm;
