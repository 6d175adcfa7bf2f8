//! End-to-end compilation tests over whole modules.

use cantata_codegen::{compile_module, CodegenError, Opcode};
use cantata_ir::{
    BinOp, DataLocation, FunctionBuilder, Module, Slice, SlotExpr, Type, U256, Value,
};

/// items[0] = 1005; items[1] = 1006; items[2] = 1007;
/// with `items: array<uint256, 3>` rooted at storage slot 0.
fn array_store_module() -> Module {
    let mut fb = FunctionBuilder::new("main", &[], None);
    for (i, v) in [1005u64, 1006, 1007].iter().enumerate() {
        let base = fb.compute_slot(SlotExpr::Array {
            base: Value::num(0u64),
        });
        let slot = fb.binary(BinOp::Add, base, Value::num(i as u64));
        fb.write(
            DataLocation::Storage,
            Some(slot),
            None,
            Slice::default(),
            Value::num(*v),
        );
    }
    fb.ret(None);
    Module::new(fb.finish())
}

#[test]
fn array_store_program_shape() {
    let module = array_store_module();

    // The source program carries exactly three array-slot computations and
    // three storage writes.
    let entry = module.main.block(module.main.entry);
    let slots = entry
        .insts
        .iter()
        .filter(|i| {
            matches!(
                i,
                cantata_ir::Inst::ComputeSlot {
                    expr: SlotExpr::Array { .. },
                    ..
                }
            )
        })
        .count();
    let writes = entry
        .insts
        .iter()
        .filter(|i| {
            matches!(
                i,
                cantata_ir::Inst::Write {
                    location: DataLocation::Storage,
                    ..
                }
            )
        })
        .count();
    assert_eq!(slots, 3);
    assert_eq!(writes, 3);

    let compiled = compile_module(&module).unwrap();

    // Full-word stores lower to exactly one SSTORE each.
    assert_eq!(compiled.runtime.count_op(Opcode::SStore), 3);
    // The deployment wrapper copies the runtime out and returns it.
    assert_eq!(compiled.create.count_op(Opcode::CodeCopy), 1);
    assert_eq!(compiled.create.count_op(Opcode::Return), 1);
    // The runtime is embedded verbatim at the tail of the create code.
    assert!(compiled.create.bytes.ends_with(&compiled.runtime.bytes));
}

#[test]
fn partial_storage_write_round_trips_through_its_masks() {
    // Write 4 bytes at byte offset 2 of an initially zero storage word.
    let mut fb = FunctionBuilder::new("main", &[], None);
    fb.write(
        DataLocation::Storage,
        Some(Value::num(0u64)),
        None,
        Slice::new(2, 4),
        Value::num(0xdeadbeefu64),
    );
    fb.ret(None);
    let module = Module::new(fb.finish());

    let compiled = compile_module(&module).unwrap();

    // Recover the constants the lowering chose.
    let imms: Vec<U256> = compiled
        .runtime
        .insts
        .iter()
        .filter(|i| matches!(i.op, Opcode::Push(_)) && !i.imm.is_empty())
        .map(|i| U256::from_big_endian(&i.imm))
        .collect();

    let shift = U256::from((32 - 2 - 4) * 8);
    let vmask = (U256::one() << 32usize) - U256::one();
    let clear = !(vmask << shift.low_u64() as usize);
    assert!(imms.contains(&shift), "shift constant {shift} missing");
    assert!(imms.contains(&clear), "clear mask missing");

    // Apply the emitted read-modify-write algebra to a zero word.
    let value = U256::from(0xdeadbeefu64);
    let stored = (U256::zero() & clear) | ((value & vmask) << shift.low_u64() as usize);
    // Exactly those four bytes are set, at bytes 2..6 of the word.
    let expected_bytes = {
        let mut word = [0u8; 32];
        word[2..6].copy_from_slice(&0xdeadbeefu32.to_be_bytes());
        U256::from_big_endian(&word)
    };
    assert_eq!(stored, expected_bytes);
    // And the partial-read path recovers the original value.
    assert_eq!((stored >> shift.low_u64() as usize) & vmask, value);
}

#[test]
fn call_targets_are_patched_to_function_entries() {
    // main: x = id(41); return x    id(n): return n
    let mut main = FunctionBuilder::new("main", &[], Some(Type::word()));
    let cont = main.append_block();
    let result = main.call("id", [Value::num(41u64)], true, cont).unwrap();
    main.switch_to_block(cont);
    main.ret(Some(result));
    let mut module = Module::new(main.finish());

    let mut id = FunctionBuilder::new("id", &[("n".into(), Type::word())], Some(Type::word()));
    let n = id.param(0);
    id.ret(Some(n));
    module.add_function(id.finish());

    let compiled = compile_module(&module).unwrap();

    // Every JUMP immediate lands on a JUMPDEST.
    let mut offset = 0usize;
    let mut jump_targets = Vec::new();
    for (idx, inst) in compiled.runtime.insts.iter().enumerate() {
        if inst.op == Opcode::Push(2) {
            let next = compiled.runtime.insts.get(idx + 1).map(|i| i.op);
            if matches!(next, Some(Opcode::Jump) | Some(Opcode::JumpI)) {
                let target = u16::from_be_bytes([inst.imm[0], inst.imm[1]]) as usize;
                jump_targets.push(target);
            }
        }
        offset += inst.size();
    }
    assert_eq!(offset, compiled.runtime.bytes.len());
    assert!(!jump_targets.is_empty());
    for target in jump_targets {
        assert_eq!(
            compiled.runtime.bytes[target],
            Opcode::JumpDest.byte(),
            "jump target {target:#x} is not a JUMPDEST"
        );
    }
}

#[test]
fn missing_callee_is_a_fatal_patch_error() {
    let mut main = FunctionBuilder::new("main", &[], None);
    let cont = main.append_block();
    main.call("missing", [], false, cont);
    main.switch_to_block(cont);
    main.ret(None);
    let module = Module::new(main.finish());

    let err = compile_module(&module).unwrap_err();
    assert_eq!(
        err,
        CodegenError::UnresolvedFunctionTarget("missing".into())
    );
    assert_eq!(err.to_string(), "Function missing not found in registry");
}

#[test]
fn main_never_falls_through_into_a_user_function() {
    // Void return at the end of main, with a function laid out after it.
    let mut main = FunctionBuilder::new("main", &[], None);
    let cont = main.append_block();
    main.call("noop", [], false, cont);
    main.switch_to_block(cont);
    main.ret(None);
    let mut module = Module::new(main.finish());

    let mut noop = FunctionBuilder::new("noop", &[], None);
    noop.ret(None);
    module.add_function(noop.finish());

    let compiled = compile_module(&module).unwrap();
    // Exactly one STOP, at the end of main's continuation block, keeps
    // control from running into noop's prologue.
    assert_eq!(compiled.runtime.count_op(Opcode::Stop), 1);
    let stop_at = compiled
        .runtime
        .bytes
        .iter()
        .position(|b| *b == Opcode::Stop.byte());
    assert!(stop_at.is_some());
}

#[test]
fn user_functions_return_through_the_return_pc_slot() {
    let mut main = FunctionBuilder::new("main", &[], Some(Type::word()));
    let cont = main.append_block();
    let r = main.call("seven", [], true, cont).unwrap();
    main.switch_to_block(cont);
    main.ret(Some(r));
    let mut module = Module::new(main.finish());

    let mut seven = FunctionBuilder::new("seven", &[], Some(Type::word()));
    seven.ret(Some(Value::num(7u64)));
    module.add_function(seven.finish());

    let compiled = compile_module(&module).unwrap();
    // The callee's return is PUSH1 0x60, MLOAD, JUMP.
    let bytes = &compiled.runtime.bytes;
    let pattern = [
        Opcode::Push(1).byte(),
        0x60,
        Opcode::MLoad.byte(),
        Opcode::Jump.byte(),
    ];
    assert!(
        bytes.windows(pattern.len()).any(|w| w == pattern),
        "return-PC jump sequence missing from runtime bytecode"
    );
}

#[test]
fn void_module_still_gets_a_deploy_wrapper() {
    let mut fb = FunctionBuilder::new("main", &[], None);
    fb.ret(None);
    let module = Module::new(fb.finish());

    let compiled = compile_module(&module).unwrap();
    assert!(!compiled.create.bytes.is_empty());
    assert_eq!(compiled.create.count_op(Opcode::CodeCopy), 1);
    // No create body: the wrapper is the whole prefix.
    let wrapper_len = compiled.create.bytes.len() - compiled.runtime.bytes.len();
    let runtime_offset_imm = &compiled.create.insts[1].imm;
    assert_eq!(runtime_offset_imm[runtime_offset_imm.len() - 1] as usize, wrapper_len);
}
