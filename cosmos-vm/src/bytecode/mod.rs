pub mod builder;
pub mod object;
pub mod opcode;

pub use builder::BytecodeBuilder;
pub use object::BytecodeObject;
pub use opcode::{Instruction, Major};
