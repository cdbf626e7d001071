pub mod array;
pub mod callable;
pub mod closure;
pub mod object;
pub mod ops;
pub mod value;

pub use array::{ArrayData, ArrayRef};
pub use callable::{Callable, NativeFn, NativeFunction, SubroutineValue};
pub use closure::Closure;
pub use object::ObjectValue;
pub use value::{make_boolean_value, make_float_value, make_integer_value, make_string_value, Value};
