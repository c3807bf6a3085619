//! Branch relaxation on functions large enough to need it.

use bumpalo::Bump;
use std::fmt::Write;
use tnt_codegen::core::{CodegenSession, MachineInstr};
use tnt_codegen::mir_text::parse_module;
use tnt_codegen::tnt::{
    BranchRelaxation, CodegenPipeline, CondCode, FixupKind, FixupTarget, Opcode, PhysReg,
    TntTarget,
};

/// An entry block holding `branch`, then `count` single-instruction blocks.
fn straight_line(branch: &str, count: usize) -> String {
    let mut text = String::from("func @big {\nentry:\n");
    writeln!(text, "  {branch}").unwrap();
    for n in 0..count {
        writeln!(text, "b{n}:\n  r12 = MOV16rr r13").unwrap();
    }
    text.push_str("}\n");
    text
}

fn filler<'a>() -> MachineInstr<'a> {
    MachineInstr::new(Opcode::Mov16rr)
        .add_def(PhysReg::R12)
        .add_use(PhysReg::R13)
}

#[test]
fn test_far_conditional_branch_over_300_blocks() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let target = TntTarget::default();

    let text = straight_line("JCC ^b299, eq", 300);
    let mut funcs = parse_module(&text, &session).unwrap();
    let func = &mut funcs[0];
    let last = func.find_block("b299").unwrap();

    let stats = BranchRelaxation::new(target.emitter()).run(func).unwrap();
    assert_eq!(stats.expanded, 1);
    assert_eq!(stats.iterations, 2);

    let entry = func.block(func.entry().unwrap()).unwrap();
    assert_eq!(
        entry.instrs,
        [
            MachineInstr::new(Opcode::Jcc)
                .add_imm(4)
                .add_imm(CondCode::Ne as i64),
            MachineInstr::new(Opcode::Bi).add_block(last),
        ]
    );
    for block in func.blocks().skip(1) {
        assert_eq!(block.instrs, [filler()]);
    }
}

#[test]
fn test_relaxed_branch_is_encoded_with_block_fixup() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let target = TntTarget::default();
    let pipeline = CodegenPipeline::new(&target, &session);

    let text = straight_line("JCC ^b299, lo", 300);
    let mut funcs = parse_module(&text, &session).unwrap();
    let encoded = pipeline.run(&mut funcs[0]).unwrap();
    let last = funcs[0].find_block("b299").unwrap();

    // Inverted skip, long branch, then 300 fillers.
    assert_eq!(encoded.bytes.len(), (2 + 300) * 8);
    assert_eq!(&encoded.bytes[..8], &[0x40, CondCode::Hs as u8, 0, 0, 4, 0, 0, 0]);
    assert_eq!(encoded.bytes[8], 0x42);
    assert_eq!(encoded.fixups.len(), 1);
    assert_eq!(encoded.fixups[0].offset, 12);
    assert_eq!(encoded.fixups[0].kind, FixupKind::PcRel2);
    assert_eq!(encoded.fixups[0].target, FixupTarget::Block(last));
    assert!(encoded.relocations().unwrap().is_empty());

    assert_eq!(encoded.relaxation.expanded, 1);
    assert_eq!(session.stats().branches_expanded, 1);
    assert_eq!(session.stats().relaxation_iterations, 2);
}

/// Relaxes a 300-block function whose entry branches to `target`.
fn expanded_for(target: &str) -> usize {
    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let tnt = TntTarget::default();

    let text = straight_line(&format!("JCC ^{target}, ne"), 300);
    let mut funcs = parse_module(&text, &session).unwrap();
    BranchRelaxation::new(tnt.emitter())
        .run(&mut funcs[0])
        .unwrap()
        .expanded
}

#[test]
fn test_displacement_boundary() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Entry branch plus 254 blocks: 510 bytes, the largest even reach.
    assert_eq!(expanded_for("b254"), 0);
    // One more block puts the target at 512.
    assert_eq!(expanded_for("b255"), 1);
}

#[test]
fn test_branch_within_reach_is_kept() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let target = TntTarget::default();

    let text = straight_line("JMP ^b200", 300);
    let mut funcs = parse_module(&text, &session).unwrap();
    let func = &mut funcs[0];
    let before = func.clone();

    let stats = BranchRelaxation::new(target.emitter()).run(func).unwrap();
    assert_eq!(stats.expanded, 0);
    assert_eq!(stats.iterations, 1);
    for (after, before) in func.blocks().zip(before.blocks()) {
        assert_eq!(after.instrs, before.instrs);
    }
}

#[test]
fn test_small_function_skips_relaxation() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let target = TntTarget::default();

    let text = straight_line("JCC ^b99, ge", 100);
    let mut funcs = parse_module(&text, &session).unwrap();
    let stats = BranchRelaxation::new(target.emitter())
        .run(&mut funcs[0])
        .unwrap();
    assert_eq!(stats.iterations, 0);
    assert_eq!(funcs[0].block(funcs[0].entry().unwrap()).unwrap().instrs[0].opcode, Opcode::Jcc);
}
