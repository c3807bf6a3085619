//! End-to-end tests driving the TNT pipeline from textual machine IR.

use bumpalo::Bump;
use object::{elf, Endianness};
use tnt_codegen::core::{BlockId, CodegenError, CodegenSession, Operand, Reg};
use tnt_codegen::mir_text::parse_module;
use tnt_codegen::tnt::{
    CodegenPipeline, FixupKind, FixupTarget, Opcode, PhysReg, Relocation, TargetOptions,
    TntTarget,
};

const CALLER: &str = "
; Loads a local, calls a helper when it is nonzero.
func @caller {
  stack_size 8
  object size=2 offset=-8
  callee_saved r5 r6
entry:
  r5 = MOV16ri 1
  r12 = MOV16rm fi#0, 0
  CMP16ri r12, 0
  JCC ^done, eq
call:
  ADJCALLSTACKDOWN 0
  JAL @helper
  ADJCALLSTACKUP 0, 0
done:
  RET
}
";

fn opcodes(func: &tnt_codegen::MachineFunction<'_>, id: BlockId) -> Vec<Opcode> {
    func.block(id).unwrap().instrs.iter().map(|mi| mi.opcode).collect()
}

#[test]
fn test_caller_is_lowered_and_encoded() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let target = TntTarget::default();
    let pipeline = CodegenPipeline::new(&target, &session);

    let mut funcs = parse_module(CALLER, &session).unwrap();
    let func = &mut funcs[0];
    let encoded = pipeline.run(func).unwrap();

    let entry = func.find_block("entry").unwrap();
    let call = func.find_block("call").unwrap();
    let done = func.find_block("done").unwrap();

    assert_eq!(
        opcodes(func, entry),
        [
            Opcode::Push16r,
            Opcode::Push16r,
            Opcode::Sub16ri,
            Opcode::Mov16ri,
            Opcode::Mov16rm,
            Opcode::Cmp16ri,
            Opcode::Jcc,
        ]
    );
    assert_eq!(opcodes(func, call), [Opcode::Jal]);
    assert_eq!(
        opcodes(func, done),
        [Opcode::Add16ri, Opcode::Pop16r, Opcode::Pop16r, Opcode::Ret]
    );

    // -8 + 2 (return address) + 8 (frame), addressed off SP.
    let load = &func.block(entry).unwrap().instrs[4];
    assert_eq!(load.operands[1].reg(), Some(Reg::Phys(PhysReg::Sp)));
    assert_eq!(load.operands[2], Operand::Imm(2));

    assert_eq!(encoded.bytes.len(), 96);
    assert_eq!(encoded.block_offset(call), Some(56));
    assert_eq!(encoded.block_offset(done), Some(64));
    assert_eq!(&encoded.bytes[32..40], &[0x22, 0x0c, 0, 0, 0x02, 0x00, 0x01, 0x00]);

    assert_eq!(encoded.fixups.len(), 2);
    assert_eq!(encoded.fixups[0].offset, 52);
    assert_eq!(encoded.fixups[0].kind, FixupKind::PcRel2);
    assert_eq!(encoded.fixups[0].target, FixupTarget::Block(done));
    assert_eq!(encoded.fixups[1].offset, 60);
    assert_eq!(encoded.fixups[1].kind, FixupKind::SecRel4);

    assert_eq!(
        encoded.relocations().unwrap(),
        [Relocation {
            offset: 60,
            symbol: "helper",
            r_type: elf::R_X86_64_PC32,
        }]
    );

    let stats = session.stats();
    assert_eq!(stats.functions_compiled, 1);
    assert_eq!(stats.instructions_encoded, 12);
    assert_eq!(stats.bytes_emitted, 96);
    assert_eq!(stats.fixups_recorded, 2);
    assert_eq!(stats.branches_expanded, 0);
}

#[test]
fn test_big_endian_stream() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let target = TntTarget::new(TargetOptions {
        endianness: Endianness::Big,
        ..TargetOptions::default()
    });
    let pipeline = CodegenPipeline::new(&target, &session);

    let text = "func @f {\nentry:\n  r12 = MOV16ri 0x1234\n  RET\n}\n";
    let mut funcs = parse_module(text, &session).unwrap();
    let encoded = pipeline.run(&mut funcs[0]).unwrap();

    assert_eq!(
        encoded.bytes,
        [
            0x21, 0xc0, 0, 0, 0, 0, 0x12, 0x34, //
            0x50, 0, 0, 0, 0, 0, 0, 0,
        ]
    );
}

#[test]
fn test_multiple_functions_share_the_session() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let target = TntTarget::default();
    let pipeline = CodegenPipeline::new(&target, &session);

    let text = "
        func @a {
        entry:
          JAL @shared
          RET
        }
        func @b {
        entry:
          r5 = LD_imm64 @shared
          RET
        }
    ";
    let mut funcs = parse_module(text, &session).unwrap();
    assert_eq!(funcs.len(), 2);

    let a = pipeline.run(&mut funcs[0]).unwrap();
    let b = pipeline.run(&mut funcs[1]).unwrap();
    assert_eq!(a.bytes.len(), 16);
    assert_eq!(b.bytes.len(), 24);

    let reloc_a = a.relocations().unwrap();
    let reloc_b = b.relocations().unwrap();
    assert!(std::ptr::eq(reloc_a[0].symbol, reloc_b[0].symbol));
    assert_eq!(reloc_b[0].r_type, elf::R_X86_64_64);
    assert_eq!(session.stats().functions_compiled, 2);
}

#[test]
fn test_unallocated_register_aborts_function() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    let target = TntTarget::default();
    let pipeline = CodegenPipeline::new(&target, &session);

    let text = "func @f {\nentry:\n  %1 = MOV16ri 3\n  RET\n}\n";
    let mut funcs = parse_module(text, &session).unwrap();
    assert!(matches!(
        pipeline.run(&mut funcs[0]),
        Err(CodegenError::Unfinalized { opcode: "MOV16ri", .. })
    ));
    assert_eq!(session.stats().functions_compiled, 0);
}
