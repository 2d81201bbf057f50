mod insn;
mod table;
