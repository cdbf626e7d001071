use std::fmt::Write;

use crate::types::value::Value;

use super::opcode::{Instruction, Major, MemberOp, Scope};

/// 已定型的编译单元：一个过程或函数。
///
/// 只有 `BytecodeBuilder::finalize` 与对象文件加载器会创建它，
/// 因此所有跳转目标都已是绝对地址。
#[derive(Debug, Clone)]
pub struct BytecodeObject {
    pub(crate) name: String,
    pub(crate) is_procedure: bool,
    pub(crate) is_varargs: bool,
    pub(crate) min_args: usize,
    pub(crate) max_args: usize,
    pub(crate) local_names: Vec<String>,
    pub(crate) names: Vec<String>,
    pub(crate) code: Vec<Instruction>,
    pub(crate) literals: Vec<Value>,
    pub(crate) file_name: String,
    /// （起始 pc, 源码行号），按 pc 排序。
    pub(crate) line_numbers: Vec<(u32, u32)>,
}

impl BytecodeObject {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_procedure(&self) -> bool {
        self.is_procedure
    }

    pub fn is_varargs(&self) -> bool {
        self.is_varargs
    }

    pub fn min_args(&self) -> usize {
        self.min_args
    }

    pub fn max_args(&self) -> usize {
        self.max_args
    }

    pub fn instruction(&self, pc: usize) -> Option<Instruction> {
        self.code.get(pc).copied()
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn literal(&self, index: usize) -> Option<&Value> {
        self.literals.get(index)
    }

    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn local_names(&self) -> &[String] {
        &self.local_names
    }

    pub fn num_locals(&self) -> usize {
        self.local_names.len()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn line_numbers(&self) -> &[(u32, u32)] {
        &self.line_numbers
    }

    /// 查询指令所在的源码行。
    ///
    /// # 参数
    /// - `pc`: 指令下标
    ///
    /// # 返回
    /// 行号；没有行号表时为 `None`
    pub fn line_for_pc(&self, pc: usize) -> Option<u32> {
        let index = self
            .line_numbers
            .partition_point(|(start, _)| *start as usize <= pc);
        index.checked_sub(1).map(|i| self.line_numbers[i].1)
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} ({}..{}{} args, {} locals)",
            if self.is_procedure { "Sub" } else { "Function" },
            self.name,
            self.min_args,
            self.max_args,
            if self.is_varargs { "+" } else { "" },
            self.local_names.len()
        );
        for (pc, insn) in self.code.iter().enumerate() {
            let _ = write!(out, "  {:5}  {}", pc, insn);
            if let Some(note) = self.annotate(insn) {
                let _ = write!(out, "    ; {}", note);
            }
            out.push('\n');
        }
        out
    }

    fn annotate(&self, insn: &Instruction) -> Option<String> {
        let index = insn.arg as usize;
        match insn.major {
            Major::Push | Major::Pop | Major::Store => match Scope::from_u8(insn.minor)? {
                Scope::Local => self.local_names.get(index).cloned(),
                Scope::Literal => self.literals.get(index).map(|v| v.to_string(true)),
                Scope::Named => self.names.get(index).cloned(),
                _ => None,
            },
            Major::Member if insn.minor == MemberOp::Load as u8 || insn.minor == MemberOp::Store as u8 => {
                self.names.get(index).cloned()
            }
            _ => None,
        }
    }
}
