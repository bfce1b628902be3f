/// Size of the sequence produced by [`return_constant`]
pub const RETURN_CONSTANT_LEN: usize = 12;

/// `movz x0, #imm16`
fn movz_x0(imm: u16) -> u32 {
    0xd280_0000 | ((imm as u32) << 5)
}

/// `movk x0, #imm16, lsl #16`
fn movk_x0_lsl16(imm: u16) -> u32 {
    0xf2a0_0000 | ((imm as u32) << 5)
}

/// `ret`
const RET: u32 = 0xd65f_03c0;

/// Generates `movz x0, #lo; movk x0, #hi, lsl #16; ret` and returns bytecode
pub fn return_constant(value: u32) -> [u8; RETURN_CONSTANT_LEN] {
    let mut code = [0u8; RETURN_CONSTANT_LEN];
    let words = [
        movz_x0(value as u16),
        movk_x0_lsl16((value >> 16) as u16),
        RET,
    ];
    for (chunk, word) in code.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    code
}
