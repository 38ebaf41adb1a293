//! x86-64 architecture-specific components.
//!
//! - [`X64CodeBuffer`], the code buffer stubs are emitted into, using iced-x86
//! - [`disassemble`], NASM-syntax listings for print-stub-code output

pub mod code_buffer;
pub mod disasm;

pub use code_buffer::X64CodeBuffer;
pub use disasm::disassemble;
