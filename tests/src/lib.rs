//! Integration tests for the Gekko JIT workspace.

#[cfg(test)]
mod asm;
#[cfg(test)]
mod backend;
#[cfg(test)]
mod core;
#[cfg(test)]
mod exec;
#[cfg(test)]
mod frontend;
