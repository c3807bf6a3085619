//! The TNT target description.
//!
//! `TntTarget` is built once from [`TargetOptions`] and handed by reference
//! to everything that needs target knowledge.

use super::emitter::TntCodeEmitter;
use super::frame_lowering::TntFrameLowering;
use super::options::{
    TargetOptions, CALLEE_SAVE_SLOT_SIZE, COMMENT_STRING, DATA_LAYOUT, POINTER_SIZE,
};
use super::registers::RegisterInfo;

#[derive(Debug, Clone, Copy)]
pub struct TntTarget {
    options: TargetOptions,
    register_info: RegisterInfo,
    frame_lowering: TntFrameLowering,
    emitter: TntCodeEmitter,
}

impl TntTarget {
    pub fn new(options: TargetOptions) -> Self {
        log::debug!(
            "TNT target: {:?} endian, disable-fp-elim={}, stack alignment {}",
            options.endianness,
            options.disable_frame_pointer_elim,
            options.stack_alignment
        );
        Self {
            options,
            register_info: RegisterInfo::new(options),
            frame_lowering: TntFrameLowering::new(options),
            emitter: TntCodeEmitter::new(options.endianness),
        }
    }

    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    pub fn register_info(&self) -> &RegisterInfo {
        &self.register_info
    }

    pub fn frame_lowering(&self) -> &TntFrameLowering {
        &self.frame_lowering
    }

    pub fn emitter(&self) -> &TntCodeEmitter {
        &self.emitter
    }

    pub fn data_layout(&self) -> &'static str {
        DATA_LAYOUT
    }

    pub fn pointer_size(&self) -> u32 {
        POINTER_SIZE
    }

    pub fn callee_save_slot_size(&self) -> u32 {
        CALLEE_SAVE_SLOT_SIZE
    }

    pub fn comment_string(&self) -> &'static str {
        COMMENT_STRING
    }
}

impl Default for TntTarget {
    fn default() -> Self {
        Self::new(TargetOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::Endianness;

    #[test]
    fn test_target_constants() {
        let target = TntTarget::default();
        assert_eq!(target.pointer_size(), 2);
        assert_eq!(target.callee_save_slot_size(), 2);
        assert_eq!(target.comment_string(), ";");
        assert!(target.data_layout().starts_with("e-m:e-p:16:16"));
        assert!(target.emitter().is_little_endian());
    }

    #[test]
    fn test_options_reach_components() {
        let target = TntTarget::new(TargetOptions {
            endianness: Endianness::Big,
            disable_frame_pointer_elim: true,
            stack_alignment: 4,
        });
        assert!(!target.emitter().is_little_endian());
        assert_eq!(target.frame_lowering().stack_alignment(), 4);
        assert!(!target.options().is_little_endian());
    }
}
