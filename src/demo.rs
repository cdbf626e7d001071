//! 示例自动任务，用于 `cosmos demo`。

use std::sync::Arc;

use cosmos_vm::{
    bytecode::{
        opcode::{jump, BinaryOp, IndirectOp, Scope, SpecialOp, UnaryOp},
        BytecodeBuilder, BytecodeObject, Major,
    },
    types::{make_string_value, SubroutineValue},
    VmError,
};

/// `Report(round, fuel)`：打印一行状态。
fn report() -> Result<Arc<BytecodeObject>, VmError> {
    let mut b = BytecodeBuilder::new("REPORT", true);
    b.set_file_name("fuelwatch.q");
    let round = b.add_argument("ROUND", false);
    let fuel = b.add_argument("FUEL", true);
    let print = b.add_name("Print");
    let prefix = b.add_literal(make_string_value("Round"));
    let unit = b.add_literal(make_string_value("kt"));

    b.add_line_number(2);
    b.add_instruction(Major::Push, Scope::Literal as u8, prefix)
        .add_instruction(Major::Push, Scope::Local as u8, round)
        .add_instruction(Major::Push, Scope::Local as u8, fuel)
        .add_instruction(Major::Push, Scope::Literal as u8, unit)
        .add_instruction(Major::Binary, BinaryOp::Concat as u8, 0)
        .add_instruction(Major::Push, Scope::Named as u8, print)
        .add_instruction(Major::Indirect, IndirectOp::Call as u8, 3);
    b.finalize()
}

/// `FuelWatch(limit)`：每回合询问一次燃料量，低于 `limit` 时停止。
/// 返回监视的回合数。
pub fn fuel_watch() -> Result<Arc<BytecodeObject>, VmError> {
    let mut b = BytecodeBuilder::new("FUELWATCH", false);
    b.set_file_name("fuelwatch.q");
    let limit = b.add_argument("LIMIT", false);
    let round = b.add_local_variable("ROUND");
    let fuel = b.add_local_variable("FUEL");
    let report = b.add_literal(SubroutineValue::new_value(report()?));
    let question = b.add_literal(make_string_value("Fuel level?"));
    let refuel = b.add_literal(make_string_value("Refuel needed"));
    let print = b.add_name("Print");
    let top = b.make_label();
    let done = b.make_label();
    let invalid = b.make_label();

    b.add_line_number(10);
    b.add_instruction(Major::Push, Scope::Integer as u8, 0)
        .add_instruction(Major::Pop, Scope::Local as u8, round);
    b.place_label(top)?;
    b.add_line_number(11);
    b.add_instruction(Major::Push, Scope::Local as u8, round)
        .add_instruction(Major::Unary, UnaryOp::Inc as u8, 0)
        .add_instruction(Major::Pop, Scope::Local as u8, round);
    b.add_line_number(12);
    b.add_jump(jump::CATCH, invalid)
        .add_instruction(Major::Special, SpecialOp::Wait as u8, question)
        .add_instruction(Major::Unary, UnaryOp::Pos as u8, 0)
        .add_instruction(Major::Pop, Scope::Local as u8, fuel)
        .add_instruction(Major::Special, SpecialOp::Uncatch as u8, 0);
    b.add_line_number(13);
    b.add_instruction(Major::Push, Scope::Local as u8, round)
        .add_instruction(Major::Push, Scope::Local as u8, fuel)
        .add_instruction(Major::Push, Scope::Literal as u8, report)
        .add_instruction(Major::Indirect, IndirectOp::Call as u8, 2);
    b.add_line_number(14);
    b.add_instruction(Major::Push, Scope::Local as u8, fuel)
        .add_instruction(Major::Push, Scope::Local as u8, limit)
        .add_instruction(Major::Binary, BinaryOp::Lt as u8, 0)
        .add_jump(jump::IF_TRUE | jump::POP, done);
    b.add_line_number(15);
    b.add_instruction(Major::Special, SpecialOp::Suspend as u8, 0)
        .add_jump(jump::ALWAYS, top);

    // non-numeric input: report it and ask again next turn
    b.place_label(invalid)?;
    b.add_line_number(17);
    b.add_instruction(Major::Push, Scope::Named as u8, print)
        .add_instruction(Major::Indirect, IndirectOp::Call as u8, 1)
        .add_instruction(Major::Special, SpecialOp::Suspend as u8, 0)
        .add_jump(jump::ALWAYS, top);

    b.place_label(done)?;
    b.add_line_number(19);
    b.add_instruction(Major::Push, Scope::Literal as u8, refuel)
        .add_instruction(Major::Push, Scope::Named as u8, print)
        .add_instruction(Major::Indirect, IndirectOp::Call as u8, 1)
        .add_instruction(Major::Push, Scope::Local as u8, round)
        .add_instruction(Major::Special, SpecialOp::Return as u8, 1);
    b.finalize()
}
