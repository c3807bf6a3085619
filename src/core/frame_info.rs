//! Per-function frame descriptor.
//!
//! `FrameInfo` records the stack geometry the register allocator and
//! frame layout hand to the backend: total stack size, whether variable
//! sized objects exist, whether the frame address escapes, and the stack
//! objects themselves. Fixed objects live at negative frame indices; the
//! most recently created fixed object has the lowest index, which is what
//! `object_index_begin` reports.

use super::error::{CodegenError, CodegenResult};
use super::mir::FrameIndex;
use std::cell::OnceCell;

/// A stack slot with a frame-relative offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameObject {
    pub offset: i64,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    /// Total stack frame size in bytes.
    pub stack_size: u64,
    pub has_var_sized_objects: bool,
    pub frame_address_taken: bool,
    /// Distance from FP to the start of the local area, set by the prologue
    /// when FP is used. Printed as the `offset_adjustment` directive of
    /// textual machine IR.
    pub offset_adjustment: i64,
    objects: Vec<FrameObject>,
    fixed_objects: Vec<FrameObject>,
    has_fp: OnceCell<bool>,
}

impl FrameInfo {
    pub fn create_stack_object(&mut self, size: u64, offset: i64) -> FrameIndex {
        self.objects.push(FrameObject { offset, size });
        FrameIndex(self.objects.len() as i32 - 1)
    }

    pub fn create_fixed_object(&mut self, size: u64, offset: i64) -> FrameIndex {
        self.fixed_objects.push(FrameObject { offset, size });
        FrameIndex(-(self.fixed_objects.len() as i32))
    }

    /// Lowest valid frame index.
    pub fn object_index_begin(&self) -> i32 {
        -(self.fixed_objects.len() as i32)
    }

    /// Ordinary objects, by frame index.
    pub fn objects(&self) -> &[FrameObject] {
        &self.objects
    }

    /// Fixed objects; entry `n` has frame index `-(n + 1)`.
    pub fn fixed_objects(&self) -> &[FrameObject] {
        &self.fixed_objects
    }

    pub fn object(&self, fi: FrameIndex) -> CodegenResult<&FrameObject> {
        let slot = if fi.is_fixed() {
            self.fixed_objects.get((-fi.0 - 1) as usize)
        } else {
            self.objects.get(fi.0 as usize)
        };
        slot.ok_or(CodegenError::UnknownFrameIndex(fi.0))
    }

    pub fn object_offset(&self, fi: FrameIndex) -> CodegenResult<i64> {
        Ok(self.object(fi)?.offset)
    }

    /// The frame-pointer decision, computing it on first use.
    ///
    /// Once decided the answer never changes for this function, even if
    /// the inputs to `decide` later would.
    pub fn has_fp_or_decide(&self, decide: impl FnOnce() -> bool) -> bool {
        *self.has_fp.get_or_init(decide)
    }

    /// The frame-pointer decision if it has been made.
    pub fn fp_decision(&self) -> Option<bool> {
        self.has_fp.get().copied()
    }
}

/// TNT-specific per-function state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionInfo {
    /// Size of the callee-saved register portion of the stack frame in bytes.
    pub callee_saved_frame_size: u64,
    /// Callee-saved registers the allocator decided to preserve, in save order.
    pub callee_saved: Vec<crate::tnt::PhysReg>,
}
