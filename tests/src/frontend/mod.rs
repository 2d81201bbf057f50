mod interp;
mod jit;
