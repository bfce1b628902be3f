use std::mem;

#[repr(C, packed)]
#[allow(dead_code)]
/// Struct helper for generating a constant-return stub
struct MovRet {
    /// `mov eax, imm32` opcode
    mov: u8,
    /// Little-endian immediate loaded into `eax`
    imm: [u8; 4],
    /// `ret`
    ret: u8,
    /// `int3` padding up to [`RETURN_CONSTANT_LEN`]
    pad: [u8; 6],
}

/// Size of the sequence produced by [`return_constant`]
pub const RETURN_CONSTANT_LEN: usize = mem::size_of::<MovRet>();

/// Generates `mov eax, value; ret` padded with `int3` and returns bytecode
pub fn return_constant(value: u32) -> [u8; RETURN_CONSTANT_LEN] {
    unsafe {
        mem::transmute(MovRet {
            mov: 0xb8,
            imm: value.to_le_bytes(),
            ret: 0xc3,
            pad: [0xcc; 6],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::return_constant;

    #[test]
    fn test_return_constant() {
        assert_eq!(
            return_constant(0x57),
            [0xb8, 0x57, 0x00, 0x00, 0x00, 0xc3, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc]
        );
        assert_eq!(&return_constant(0xdeadbeef)[1..5], &[0xef, 0xbe, 0xad, 0xde]);
    }
}
