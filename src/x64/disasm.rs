//! Disassembly of stub code for print-stub-code output.

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};

use crate::core::Address;

/// Decode `code` located at `ip` into one NASM-syntax line per instruction.
pub fn disassemble(code: &[u8], ip: Address) -> Vec<String> {
    let mut decoder = Decoder::with_ip(64, code, ip.raw(), DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();
    formatter.options_mut().set_first_operand_char_index(8);

    let mut lines = Vec::new();
    let mut output = String::new();
    let mut instruction = Instruction::default();
    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        output.clear();
        formatter.format(&instruction, &mut output);

        let start = (instruction.ip() - ip.raw()) as usize;
        let bytes = &code[start..start + instruction.len()];
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        lines.push(format!("{:#018x}  {hex:<20} {output}", instruction.ip()));
    }
    lines
}
