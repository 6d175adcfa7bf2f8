//! Module assembly: function placement, inter-function patching, and the
//! deployment wrapper.
//!
//! Phase one emits every function at its final offset and resolves jump
//! targets within each function as soon as its blocks are fixed. Phase two
//! (`patch_function_calls`) runs only after the whole layout is final and
//! rewrites both the structured instruction list and the raw byte buffer.

use indexmap::IndexMap;

use cantata_ir::Module;

use crate::{
    critical_edge::split_phi_edges,
    emit::{FuncEmitter, FuncKind, FuncOutput},
    error::CodegenError,
    opcode::{AsmInst, Opcode},
    state::{Patch, PatchTarget},
};

/// Final bytecode paired with its annotated instruction list.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub bytes: Vec<u8>,
    pub insts: Vec<AsmInst>,
}

impl Bytecode {
    fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            insts: Vec::new(),
        }
    }

    /// Number of occurrences of `op` (immediate bytes are not scanned, so a
    /// PUSH payload can never be miscounted as an opcode).
    pub fn count_op(&self, op: Opcode) -> usize {
        self.insts.iter().filter(|i| i.op == op).count()
    }
}

/// Deployment bytecode (constructor + wrapper + embedded runtime) and the
/// runtime bytecode itself.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub create: Bytecode,
    pub runtime: Bytecode,
}

pub fn compile_module(module: &Module) -> Result<CompiledModule, CodegenError> {
    // Normalize a private copy: phi moves only travel on jump edges.
    let mut module = module.clone();
    for func in module.iter_functions_mut() {
        split_phi_edges(func);
    }

    let runtime = assemble_runtime(&module)?;
    let create = assemble_create(&module, &runtime)?;

    Ok(CompiledModule { create, runtime })
}

fn assemble_runtime(module: &Module) -> Result<Bytecode, CodegenError> {
    let mut asm: Vec<AsmInst> = Vec::new();
    let mut pending: Vec<Patch> = Vec::new();
    let mut registry: IndexMap<String, usize> = IndexMap::new();
    let mut offset = 0usize;

    let main_falls_through = module.functions.is_empty();
    let out = FuncEmitter::new(&module.main, FuncKind::Main, main_falls_through).run(offset)?;
    offset = append_function(&mut asm, &mut pending, out, offset);

    for (name, func) in &module.functions {
        registry.insert(name.clone(), offset);
        let out = FuncEmitter::new(func, FuncKind::User, false).run(offset)?;
        offset = append_function(&mut asm, &mut pending, out, offset);
    }

    let mut bytes = encode(&asm);
    patch_function_calls(pending, &mut asm, &mut bytes, &registry)?;

    Ok(Bytecode { bytes, insts: asm })
}

fn assemble_create(module: &Module, runtime: &Bytecode) -> Result<Bytecode, CodegenError> {
    let mut body = match &module.create {
        Some(create) => {
            let out = FuncEmitter::new(create, FuncKind::Create, true).run(0)?;
            let mut asm = Vec::new();
            let mut pending = Vec::new();
            append_function(&mut asm, &mut pending, out, 0);
            let mut bytes = encode(&asm);
            // No functions are addressable from the constructor.
            patch_function_calls(pending, &mut asm, &mut bytes, &IndexMap::new())?;
            Bytecode { bytes, insts: asm }
        }
        None => Bytecode::empty(),
    };

    let wrapper = deployment_wrapper(body.bytes.len(), runtime.bytes.len());
    for inst in wrapper {
        inst.encode_into(&mut body.bytes);
        body.insts.push(inst);
    }
    body.bytes.extend_from_slice(&runtime.bytes);
    Ok(body)
}

fn append_function(
    asm: &mut Vec<AsmInst>,
    pending: &mut Vec<Patch>,
    out: FuncOutput,
    offset: usize,
) -> usize {
    let base_index = asm.len();
    asm.extend(out.asm);
    pending.extend(out.patches.into_iter().map(|mut p| {
        p.asm_index += base_index;
        p
    }));
    offset + out.size
}

fn encode(asm: &[AsmInst]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(asm.len() * 2);
    for inst in asm {
        inst.encode_into(&mut bytes);
    }
    bytes
}

/// Second patch phase: resolve call targets against the finished function
/// layout, rewriting the byte buffer as well as the instruction list.
fn patch_function_calls(
    pending: Vec<Patch>,
    asm: &mut [AsmInst],
    bytes: &mut [u8],
    registry: &IndexMap<String, usize>,
) -> Result<(), CodegenError> {
    for patch in pending {
        let PatchTarget::Function(name) = &patch.target else {
            // Block patches never survive phase one.
            unreachable!("intra-function patch leaked into the call phase");
        };
        let target = *registry
            .get(name)
            .ok_or_else(|| CodegenError::UnresolvedFunctionTarget(name.clone()))?;
        let imm = u16::try_from(target)
            .map_err(|_| CodegenError::JumpTargetOutOfRange(target))?
            .to_be_bytes();
        asm[patch.asm_index].imm.copy_from_slice(&imm);
        bytes[patch.byte_offset..patch.byte_offset + 2].copy_from_slice(&imm);
    }
    Ok(())
}

/// Constructor epilogue: copy the runtime to memory and return it.
///
/// The PUSH widths depend on the very offsets being computed (the runtime
/// starts after the wrapper itself), so the size is iterated to a fixed
/// point before the instructions are built.
fn deployment_wrapper(body_len: usize, runtime_len: usize) -> Vec<AsmInst> {
    fn push_width(value: usize) -> usize {
        let mut width = 0;
        let mut v = value;
        while v > 0 {
            width += 1;
            v >>= 8;
        }
        width
    }
    fn push(value: usize) -> AsmInst {
        let width = push_width(value);
        let be = value.to_be_bytes();
        AsmInst::with_imm(
            Opcode::Push(width as u8),
            &be[be.len() - width..],
            Default::default(),
        )
    }

    let mut wrapper_len = 0usize;
    loop {
        let runtime_offset = body_len + wrapper_len;
        // PUSH len, PUSH offset, PUSH0, CODECOPY, PUSH len, PUSH0, RETURN
        let next = (1 + push_width(runtime_len))
            + (1 + push_width(runtime_offset))
            + 1
            + 1
            + (1 + push_width(runtime_len))
            + 1
            + 1;
        if next == wrapper_len {
            break;
        }
        wrapper_len = next;
    }

    let runtime_offset = body_len + wrapper_len;
    vec![
        push(runtime_len),
        push(runtime_offset),
        push(0),
        AsmInst::new(Opcode::CodeCopy, Default::default()),
        push(runtime_len),
        push(0),
        AsmInst::new(Opcode::Return, Default::default()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_size_reaches_a_fixed_point() {
        let wrapper = deployment_wrapper(0, 0x100);
        let size: usize = wrapper.iter().map(AsmInst::size).sum();
        // PUSH2 len + PUSH1 offset + PUSH0 + CODECOPY + PUSH2 len + PUSH0 + RETURN
        assert_eq!(size, 3 + 2 + 1 + 1 + 3 + 1 + 1);
        // The runtime offset equals the wrapper size when there is no body.
        assert_eq!(&wrapper[1].imm[..], &[size as u8]);
    }

    #[test]
    fn wrapper_for_empty_runtime() {
        let wrapper = deployment_wrapper(0, 0);
        // All pushes collapse to PUSH0.
        assert!(wrapper.iter().all(|i| i.imm.len() <= 1));
    }
}
