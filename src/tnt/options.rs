//! Construction-time target configuration.

use object::Endianness;

/// Data layout string of the TNT target.
pub const DATA_LAYOUT: &str = "e-m:e-p:16:16-i32:16:32-a:16-n8:16";

/// Pointer size in bytes.
pub const POINTER_SIZE: u32 = 2;

/// Stack slot size used for each callee-saved register.
pub const CALLEE_SAVE_SLOT_SIZE: u32 = 2;

/// Comment leader of the target assembler.
pub const COMMENT_STRING: &str = ";";

/// Options fixed when the target is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOptions {
    /// Byte order of the emitted instruction stream.
    pub endianness: Endianness,
    /// Keep a frame pointer in every function.
    pub disable_frame_pointer_elim: bool,
    /// Stack alignment in bytes.
    pub stack_alignment: u32,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            endianness: Endianness::Little,
            disable_frame_pointer_elim: false,
            stack_alignment: 2,
        }
    }
}

impl TargetOptions {
    pub fn is_little_endian(&self) -> bool {
        self.endianness == Endianness::Little
    }
}
