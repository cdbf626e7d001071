//! 指令处理函数与分发表。
//!
//! 每个主操作码对应一个处理函数，`step` 取出当前帧的下一条指令，
//! 先推进程序计数器，再按 `Major` 下标查表调用。

use std::sync::Arc;

use crate::{
    bytecode::opcode::{
        jump, BinaryOp, IndirectOp, Instruction, MemberOp, Scope, SpecialOp, StackOp,
        UnaryOp, NUM_MAJORS,
    },
    error::VmError,
    types::{
        array::{ArrayData, ArrayRef},
        closure::Closure,
        ops,
        value::Value,
    },
};

use super::{Environment, Handler, Process, StepResult, SuspensionKey};

type InstructionHandler = fn(&mut Process, &mut Environment, Instruction) -> Result<StepResult, VmError>;

/// 以 `Major as usize` 为下标的处理函数表。
static INSTRUCTION_TABLE: [InstructionHandler; NUM_MAJORS] = [
    push,     // Push
    pop,      // Pop
    store,    // Store
    binary,   // Binary
    unary,    // Unary
    jump_to,  // Jump
    indirect, // Indirect
    member,   // Member
    stack,    // Stack
    special,  // Special
];

pub(crate) fn step(process: &mut Process, env: &mut Environment) -> Result<StepResult, VmError> {
    let Some(frame) = process.frames.last_mut() else {
        return Ok(StepResult::Ended);
    };
    let pc = frame.pc;
    let Some(insn) = frame.bco.instruction(pc) else {
        if pc == frame.bco.code().len() {
            return process.return_from_frame(None);
        }
        return Err(VmError::fault(format!(
            "program counter {} outside '{}'",
            pc,
            frame.bco.name()
        )));
    };
    frame.pc = pc + 1;
    INSTRUCTION_TABLE[insn.major as usize](process, env, insn)
}

fn invalid(insn: Instruction) -> VmError {
    VmError::fault(format!("invalid instruction '{}'", insn))
}

fn current_frame(process: &mut Process) -> Result<&mut super::Frame, VmError> {
    process
        .frames
        .last_mut()
        .ok_or_else(|| VmError::fault("no active frame"))
}

fn global_name(process: &Process, index: u16) -> Result<String, VmError> {
    process
        .frames
        .last()
        .and_then(|f| f.bco.name_at(index as usize))
        .map(str::to_string)
        .ok_or_else(|| VmError::fault(format!("name index {} out of range", index)))
}

fn push(process: &mut Process, env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let index = insn.arg as usize;
    let value = match Scope::from_u8(insn.minor).ok_or_else(|| invalid(insn))? {
        Scope::Local => current_frame(process)?
            .locals
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::fault(format!("local {} out of range", index)))?,
        Scope::Literal => current_frame(process)?
            .bco
            .literal(index)
            .cloned()
            .ok_or_else(|| VmError::fault(format!("literal {} out of range", index)))?,
        Scope::Integer => Value::Integer(insn.arg as i16 as i32),
        Scope::Boolean => match insn.arg as i16 {
            i if i < 0 => Value::Null,
            0 => Value::Boolean(false),
            _ => Value::Boolean(true),
        },
        Scope::Named => {
            let name = global_name(process, insn.arg)?;
            env.get(&name).ok_or(VmError::UnknownIdentifier(name))?
        }
    };
    process.push_value(value)?;
    Ok(StepResult::Continue)
}

fn assign(process: &mut Process, env: &mut Environment, insn: Instruction, value: Value) -> Result<(), VmError> {
    let index = insn.arg as usize;
    match Scope::from_u8(insn.minor).ok_or_else(|| invalid(insn))? {
        Scope::Local => {
            let slot = current_frame(process)?
                .locals
                .get_mut(index)
                .ok_or_else(|| VmError::fault(format!("local {} out of range", index)))?;
            *slot = value;
        }
        Scope::Named => {
            let name = global_name(process, insn.arg)?;
            env.set(&name, &value);
        }
        scope => {
            return Err(VmError::NotAssignable(format!("{:?} {}", scope, index).to_lowercase()));
        }
    }
    Ok(())
}

fn pop(process: &mut Process, env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let value = process.pop_value()?;
    assign(process, env, insn, value)?;
    Ok(StepResult::Continue)
}

fn store(process: &mut Process, env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let value = process.top_value(0)?.clone();
    assign(process, env, insn, value)?;
    Ok(StepResult::Continue)
}

fn binary(process: &mut Process, _env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let op = BinaryOp::from_u8(insn.minor).ok_or_else(|| invalid(insn))?;
    let b = process.pop_value()?;
    let a = process.pop_value()?;
    let result = ops::binary(op, &a, &b)?;
    process.push_value(result)?;
    Ok(StepResult::Continue)
}

fn unary(process: &mut Process, _env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let op = UnaryOp::from_u8(insn.minor).ok_or_else(|| invalid(insn))?;
    let a = process.pop_value()?;
    let result = ops::unary(op, &a)?;
    process.push_value(result)?;
    Ok(StepResult::Continue)
}

fn jump_to(process: &mut Process, _env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let flags = insn.minor;
    let target = insn.arg as usize;
    if flags & jump::SYMBOLIC != 0 {
        return Err(invalid(insn));
    }
    let depth = process.stack.len();
    let frame = current_frame(process)?;
    if target > frame.bco.code().len() {
        return Err(VmError::fault(format!("jump target {} outside '{}'", target, frame.bco.name())));
    }
    if flags & jump::CATCH != 0 {
        frame.handlers.push(Handler {
            target,
            stack_depth: depth,
        });
        return Ok(StepResult::Continue);
    }

    let taken = if flags & jump::ALWAYS == jump::ALWAYS {
        true
    } else {
        let condition = match process.top_value(0)?.to_bool() {
            Some(true) => jump::IF_TRUE,
            Some(false) => jump::IF_FALSE,
            None => jump::IF_EMPTY,
        };
        flags & condition != 0
    };
    if flags & jump::POP != 0 {
        process.pop_value()?;
    }
    if taken {
        current_frame(process)?.pc = target;
    }
    Ok(StepResult::Continue)
}

fn indirect(process: &mut Process, _env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let op = IndirectOp::from_u8(insn.minor).ok_or_else(|| invalid(insn))?;
    let callee = process.pop_value()?;
    let args = process.pop_values(insn.arg as usize)?;
    match (op, callee) {
        (IndirectOp::Call, Value::Callable(c)) => c.call(process, args, false)?,
        (IndirectOp::Function | IndirectOp::Load, Value::Callable(c)) => c.call(process, args, true)?,
        (IndirectOp::Function | IndirectOp::Load, Value::Array(array)) => {
            let element = array.read()?.get(&args)?;
            process.push_value(element)?;
        }
        (IndirectOp::Function | IndirectOp::Load, Value::Null) => process.push_value(Value::Null)?,
        (IndirectOp::Store, Value::Array(array)) => {
            let value = process.pop_value()?;
            array.write()?.set(&args, value)?;
        }
        (IndirectOp::Store, Value::Callable(c)) => {
            return Err(VmError::NotAssignable(c.name().to_string()));
        }
        (op, other) => {
            return Err(VmError::type_mismatch(format!(
                "cannot {:?} a value of type {}",
                op,
                other.type_name()
            )
            .to_lowercase()));
        }
    }
    Ok(StepResult::Continue)
}

fn member(process: &mut Process, _env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let name = global_name(process, insn.arg)?;
    let object = process.pop_value()?;
    if insn.minor == MemberOp::Load as u8 {
        let value = match object {
            Value::Object(o) => o.get_member(&name)?,
            Value::Null => Value::Null,
            other => {
                return Err(VmError::type_mismatch(format!(
                    "{} has no member '{}'",
                    other.type_name(),
                    name
                )))
            }
        };
        process.push_value(value)?;
    } else if insn.minor == MemberOp::Store as u8 {
        let value = process.pop_value()?;
        match object {
            Value::Object(o) => o.set_member(&name, value)?,
            other => {
                return Err(VmError::type_mismatch(format!(
                    "{} has no member '{}'",
                    other.type_name(),
                    name
                )))
            }
        }
    } else {
        return Err(invalid(insn));
    }
    Ok(StepResult::Continue)
}

fn stack(process: &mut Process, _env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    let arg = insn.arg as usize;
    match StackOp::from_u8(insn.minor).ok_or_else(|| invalid(insn))? {
        StackOp::Dup => {
            let value = process.top_value(arg)?.clone();
            process.push_value(value)?;
        }
        StackOp::Drop => {
            process.pop_values(arg)?;
        }
        StackOp::Swap => {
            process.top_value(arg + 1)?;
            let top = process.stack.len() - 1;
            process.stack.swap(top, top - 1 - arg);
        }
    }
    Ok(StepResult::Continue)
}

fn special(process: &mut Process, _env: &mut Environment, insn: Instruction) -> Result<StepResult, VmError> {
    match SpecialOp::from_u8(insn.minor).ok_or_else(|| invalid(insn))? {
        SpecialOp::Uncatch => {
            current_frame(process)?
                .handlers
                .pop()
                .ok_or_else(|| VmError::fault("uncatch without handler"))?;
            Ok(StepResult::Continue)
        }
        SpecialOp::Return => {
            let value = if insn.arg != 0 { Some(process.pop_value()?) } else { None };
            process.return_from_frame(value)
        }
        SpecialOp::Throw => {
            let value = process.pop_value()?;
            Err(VmError::Thrown(value.to_string(false)))
        }
        SpecialOp::Terminate => Ok(StepResult::Terminate),
        SpecialOp::Suspend => Ok(StepResult::Suspend),
        SpecialOp::Wait => {
            let key = current_frame(process)?
                .bco
                .literal(insn.arg as usize)
                .map(|v| v.to_string(false))
                .ok_or_else(|| VmError::fault(format!("literal {} out of range", insn.arg)))?;
            Ok(StepResult::Wait(SuspensionKey(key)))
        }
        SpecialOp::Bind => {
            let count = insn.arg as usize;
            let Value::Callable(base) = process.pop_value()? else {
                return Err(VmError::type_mismatch("only callables can be bound"));
            };
            let args = process.pop_values(count)?;
            let mut closure = Closure::new(base);
            closure.add_arguments_from(&args, count)?;
            process.push_value(Value::Callable(Arc::new(closure)))?;
            Ok(StepResult::Continue)
        }
        SpecialOp::NewArray => {
            let mut dims = Vec::with_capacity(insn.arg as usize);
            for value in process.pop_values(insn.arg as usize)? {
                let dim = value.expect_integer("array dimension")?;
                if dim < 0 {
                    return Err(VmError::RangeError(format!("negative array dimension {}", dim)));
                }
                dims.push(dim as usize);
            }
            let array = ArrayData::new(dims)?;
            process.push_value(Value::Array(ArrayRef::new(array)))?;
            Ok(StepResult::Continue)
        }
    }
}
