//! Cosmos 虚拟机指令编码。
//!
//! - `Instruction`：主操作码 + 次操作码 + 16 位参数，持久化时占 4 字节。
//! - `Major`：指令大类，决定分发表中的处理函数。
//! - `Scope` / `BinaryOp` / `UnaryOp` / 跳转标志等：次操作码的具体含义。

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// 指令大类。分发表按此下标索引，因此取值必须连续。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Major {
    Push = 0,
    Pop = 1,
    Store = 2,
    Binary = 3,
    Unary = 4,
    Jump = 5,
    Indirect = 6,
    Member = 7,
    Stack = 8,
    Special = 9,
}

pub const NUM_MAJORS: usize = 10;

impl Major {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Push),
            1 => Some(Self::Pop),
            2 => Some(Self::Store),
            3 => Some(Self::Binary),
            4 => Some(Self::Unary),
            5 => Some(Self::Jump),
            6 => Some(Self::Indirect),
            7 => Some(Self::Member),
            8 => Some(Self::Stack),
            9 => Some(Self::Special),
            _ => None,
        }
    }
}

/// `Push`、`Pop` 与 `Store` 的操作数来源或去向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Scope {
    Local = 0,
    Literal = 1,
    Integer = 2,
    Boolean = 3,
    Named = 4,
}

impl Scope {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Local),
            1 => Some(Self::Literal),
            2 => Some(Self::Integer),
            3 => Some(Self::Boolean),
            4 => Some(Self::Named),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    IntDiv = 4,
    Mod = 5,
    Pow = 6,
    Concat = 7,
    Eq = 8,
    Ne = 9,
    Lt = 10,
    Le = 11,
    Gt = 12,
    Ge = 13,
    And = 14,
    Or = 15,
    Xor = 16,
    Min = 17,
    Max = 18,
}

impl BinaryOp {
    pub fn from_u8(code: u8) -> Option<Self> {
        use BinaryOp::*;
        const ALL: [BinaryOp; 19] = [
            Add, Sub, Mul, Div, IntDiv, Mod, Pow, Concat, Eq, Ne, Lt, Le, Gt, Ge, And, Or, Xor,
            Min, Max,
        ];
        ALL.get(code as usize).copied()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IntDiv => "\\",
            BinaryOp::Mod => "Mod",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "And",
            BinaryOp::Or => "Or",
            BinaryOp::Xor => "Xor",
            BinaryOp::Min => "Min",
            BinaryOp::Max => "Max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnaryOp {
    Not = 0,
    Neg = 1,
    Pos = 2,
    IsNull = 3,
    Bool = 4,
    Str = 5,
    Inc = 6,
    Dec = 7,
    Abs = 8,
    IsNumber = 9,
    IsString = 10,
}

impl UnaryOp {
    pub fn from_u8(code: u8) -> Option<Self> {
        use UnaryOp::*;
        const ALL: [UnaryOp; 11] = [Not, Neg, Pos, IsNull, Bool, Str, Inc, Dec, Abs, IsNumber, IsString];
        ALL.get(code as usize).copied()
    }
}

/// 跳转标志位。三个条件位全部置位即为无条件跳转。
pub mod jump {
    pub const IF_TRUE: u8 = 0b0000_0001;
    pub const IF_FALSE: u8 = 0b0000_0010;
    pub const IF_EMPTY: u8 = 0b0000_0100;
    pub const ALWAYS: u8 = IF_TRUE | IF_FALSE | IF_EMPTY;
    pub const POP: u8 = 0b0000_1000;
    pub const CATCH: u8 = 0b0001_0000;
    /// `arg` 为标签编号，定型时替换为绝对地址。
    pub const SYMBOLIC: u8 = 0b0010_0000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndirectOp {
    Call = 0,
    Function = 1,
    Load = 2,
    Store = 3,
}

impl IndirectOp {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Call),
            1 => Some(Self::Function),
            2 => Some(Self::Load),
            3 => Some(Self::Store),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemberOp {
    Load = 0,
    Store = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StackOp {
    Dup = 0,
    Drop = 1,
    Swap = 2,
}

impl StackOp {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Dup),
            1 => Some(Self::Drop),
            2 => Some(Self::Swap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpecialOp {
    Uncatch = 0,
    Return = 1,
    Throw = 2,
    Terminate = 3,
    Suspend = 4,
    Wait = 5,
    Bind = 6,
    NewArray = 7,
}

impl SpecialOp {
    pub fn from_u8(code: u8) -> Option<Self> {
        use SpecialOp::*;
        const ALL: [SpecialOp; 8] = [Uncatch, Return, Throw, Terminate, Suspend, Wait, Bind, NewArray];
        ALL.get(code as usize).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub major: Major,
    pub minor: u8,
    pub arg: u16,
}

impl Instruction {
    pub fn new(major: Major, minor: u8, arg: u16) -> Self {
        Instruction { major, minor, arg }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let arg = self.arg.to_le_bytes();
        [self.major as u8, self.minor, arg[0], arg[1]]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Some(Instruction {
            major: Major::from_u8(bytes[0])?,
            minor: bytes[1],
            arg: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn is_jump(&self) -> bool {
        self.major == Major::Jump
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let arg = self.arg;
        match self.major {
            Major::Push | Major::Pop | Major::Store => {
                let scope = Scope::from_u8(self.minor)
                    .map(|s| format!("{:?}", s).to_lowercase())
                    .unwrap_or_else(|| format!("?{}", self.minor));
                write!(f, "{:<8} {} {}", format!("{:?}", self.major).to_lowercase(), scope, arg)
            }
            Major::Binary => match BinaryOp::from_u8(self.minor) {
                Some(op) => write!(f, "binary   {}", op.symbol()),
                None => write!(f, "binary   ?{}", self.minor),
            },
            Major::Unary => match UnaryOp::from_u8(self.minor) {
                Some(op) => write!(f, "unary    {:?}", op),
                None => write!(f, "unary    ?{}", self.minor),
            },
            Major::Jump => {
                let mut flags = String::new();
                if self.minor & jump::CATCH != 0 {
                    flags.push_str("catch");
                } else if self.minor & jump::ALWAYS == jump::ALWAYS {
                    flags.push_str("always");
                } else {
                    if self.minor & jump::IF_TRUE != 0 {
                        flags.push('t');
                    }
                    if self.minor & jump::IF_FALSE != 0 {
                        flags.push('f');
                    }
                    if self.minor & jump::IF_EMPTY != 0 {
                        flags.push('e');
                    }
                }
                if self.minor & jump::POP != 0 {
                    flags.push_str("+pop");
                }
                let target = if self.minor & jump::SYMBOLIC != 0 { "#" } else { "@" };
                write!(f, "jump     {} {}{}", flags, target, arg)
            }
            Major::Indirect => match IndirectOp::from_u8(self.minor) {
                Some(op) => write!(f, "indirect {:?} {}", op, arg),
                None => write!(f, "indirect ?{} {}", self.minor, arg),
            },
            Major::Member => write!(
                f,
                "member   {} {}",
                if self.minor == MemberOp::Store as u8 { "store" } else { "load" },
                arg
            ),
            Major::Stack => match StackOp::from_u8(self.minor) {
                Some(op) => write!(f, "stack    {:?} {}", op, arg),
                None => write!(f, "stack    ?{} {}", self.minor, arg),
            },
            Major::Special => match SpecialOp::from_u8(self.minor) {
                Some(op) => write!(f, "special  {:?} {}", op, arg),
                None => write!(f, "special  ?{} {}", self.minor, arg),
            },
        }
    }
}
