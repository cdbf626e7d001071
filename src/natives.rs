use cosmos_vm::{
    types::{make_integer_value, make_string_value, NativeFunction, Value},
    Environment, VmError,
};

/// 把宿主内置函数注册到 `env`。
pub fn register(env: &mut Environment) {
    env.define_native(NativeFunction::new_procedure("PRINT", 0, None, print));
    env.define_native(NativeFunction::new("LEN", 1, Some(1), len));
    env.define_native(NativeFunction::new("STR", 1, Some(1), str));
    env.define_native(NativeFunction::new("VAL", 1, Some(1), val));
}

/// 按脚本的视角解析终端输入：先尝试整数，再尝试浮点数，否则保留原文。
/// 空白输入为 Null。
pub fn parse_input(text: &str) -> Value {
    let text = text.trim();
    if text.is_empty() {
        return Value::Null;
    }
    parse_number(text).unwrap_or_else(|| make_string_value(text))
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i32>() {
        return Some(make_integer_value(i));
    }
    text.parse::<f64>().ok().filter(|f| f.is_finite()).map(Value::Float)
}

fn print(args: &[Value]) -> Result<Value, VmError> {
    let line: Vec<String> = args.iter().map(|v| v.to_string(false)).collect();
    println!("{}", line.join(" "));
    Ok(Value::Null)
}

fn len(args: &[Value]) -> Result<Value, VmError> {
    Ok(match &args[0] {
        Value::Null => Value::Null,
        Value::String(s) => make_integer_value(s.chars().count() as i32),
        other => make_integer_value(other.to_string(false).chars().count() as i32),
    })
}

fn str(args: &[Value]) -> Result<Value, VmError> {
    Ok(match &args[0] {
        Value::Null => Value::Null,
        other => make_string_value(other.to_string(false)),
    })
}

fn val(args: &[Value]) -> Result<Value, VmError> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(parse_number(s.trim()).unwrap_or(Value::Null)),
        other => Err(VmError::TypeMismatch(format!("Val expects a string, got {}", other.type_name()))),
    }
}
