//! Plain-text dump of IR functions, for logs and test assertions.

use std::io;

use crate::{
    function::Function,
    inst::{Inst, OffsetExpr, SlotExpr, Terminator},
    module::Module,
    value::Value,
};

pub fn write_module<W: io::Write>(module: &Module, w: &mut W) -> io::Result<()> {
    if let Some(create) = &module.create {
        write_function(create, w)?;
        writeln!(w)?;
    }
    write_function(&module.main, w)?;
    for func in module.functions.values() {
        writeln!(w)?;
        write_function(func, w)?;
    }
    Ok(())
}

pub fn write_function<W: io::Write>(func: &Function, w: &mut W) -> io::Result<()> {
    write!(w, "func %{}(", func.name)?;
    for (i, param) in func.params.iter().enumerate() {
        if i != 0 {
            write!(w, ", ")?;
        }
        write!(w, "{} {}: {}", param.temp, param.name, param.ty)?;
    }
    write!(w, ")")?;
    if let Some(ret) = func.ret_ty {
        write!(w, " -> {ret}")?;
    }
    writeln!(w, " {{")?;

    for (&id, block) in &func.blocks {
        writeln!(w, "    {id}:")?;
        for phi in &block.phis {
            write!(w, "        {} = phi", phi.dest)?;
            for (src, value) in &phi.args {
                write!(w, " ({src} {value})")?;
            }
            writeln!(w)?;
        }
        for inst in &block.insts {
            write!(w, "        ")?;
            write_inst(inst, w)?;
            writeln!(w)?;
        }
        write!(w, "        ")?;
        write_terminator(&block.terminator, w)?;
        writeln!(w)?;
    }
    writeln!(w, "}}")
}

fn write_inst<W: io::Write>(inst: &Inst, w: &mut W) -> io::Result<()> {
    match inst {
        Inst::Const { dest, value, .. } => write!(w, "{dest} = const {value}"),
        Inst::Allocate { dest, size, .. } => write!(w, "{dest} = allocate {size}"),
        Inst::Read {
            dest,
            location,
            slot,
            offset,
            slice,
            ..
        } => {
            write!(w, "{dest} = read {location}")?;
            write_addr(w, slot, offset)?;
            if !slice.full_word() {
                write!(w, " [{}+{}]", slice.offset, slice.length)?;
            }
            Ok(())
        }
        Inst::Write {
            location,
            slot,
            offset,
            slice,
            value,
            ..
        } => {
            write!(w, "write {location}")?;
            write_addr(w, slot, offset)?;
            if !slice.full_word() {
                write!(w, " [{}+{}]", slice.offset, slice.length)?;
            }
            write!(w, " <- {value}")
        }
        Inst::ComputeSlot { dest, expr, .. } => match expr {
            SlotExpr::Mapping { base, key } => {
                write!(w, "{dest} = slot.mapping {base} key {key}")
            }
            SlotExpr::Array { base } => write!(w, "{dest} = slot.array {base}"),
            SlotExpr::Field { base, delta } => {
                write!(w, "{dest} = slot.field {base} +{delta}")
            }
        },
        Inst::ComputeOffset { dest, expr, .. } => match expr {
            OffsetExpr::Array {
                base,
                index,
                stride,
            } => write!(w, "{dest} = offset.array {base} [{index} * {stride}]"),
            OffsetExpr::Field { base, offset } => {
                write!(w, "{dest} = offset.field {base} +{offset}")
            }
            OffsetExpr::Byte { base, byte } => write!(w, "{dest} = offset.byte {base} +{byte}"),
        },
        Inst::Binary {
            dest, op, lhs, rhs, ..
        } => write!(w, "{dest} = {op} {lhs} {rhs}"),
        Inst::Unary { dest, op, arg, .. } => write!(w, "{dest} = {op} {arg}"),
        Inst::Env { dest, op, .. } => write!(w, "{dest} = env.{op}"),
        Inst::Hash { dest, arg, .. } => write!(w, "{dest} = keccak256 {arg}"),
        Inst::Cast { dest, arg, ty, .. } => write!(w, "{dest} = cast {arg} to {ty}"),
        Inst::Length {
            dest,
            arg,
            location,
            ..
        } => write!(w, "{dest} = length {location} {arg}"),
    }
}

fn write_addr<W: io::Write>(w: &mut W, slot: &Option<Value>, offset: &Option<Value>) -> io::Result<()> {
    if let Some(slot) = slot {
        write!(w, " slot {slot}")?;
    }
    if let Some(offset) = offset {
        write!(w, " @{offset}")?;
    }
    Ok(())
}

fn write_terminator<W: io::Write>(term: &Terminator, w: &mut W) -> io::Result<()> {
    match term {
        Terminator::Jump { target, .. } => write!(w, "jump {target}"),
        Terminator::Branch {
            cond,
            then_dest,
            else_dest,
            ..
        } => write!(w, "branch {cond} {then_dest} {else_dest}"),
        Terminator::Return { value: None, .. } => write!(w, "return"),
        Terminator::Return {
            value: Some(value), ..
        } => write!(w, "return {value}"),
        Terminator::Call {
            callee,
            args,
            dest,
            continuation,
            ..
        } => {
            if let Some(dest) = dest {
                write!(w, "{dest} = ")?;
            }
            write!(w, "call %{callee}(")?;
            for (i, arg) in args.iter().enumerate() {
                if i != 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{arg}")?;
            }
            write!(w, ") then {continuation}")
        }
    }
}

/// Render a function to a `String`; test suites assert against this.
pub fn function_to_string(func: &Function) -> String {
    let mut buf = Vec::new();
    write_function(func, &mut buf).expect("write to Vec cannot fail");
    String::from_utf8(buf).expect("writer emits utf8")
}
