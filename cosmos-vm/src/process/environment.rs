use rustc_hash::FxHashMap;

use crate::types::{callable::NativeFunction, value::Value};

/// 解析脚本自身未定义的名字，例如游戏会话的属性。由宿主提供。
pub trait NameLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// 同一调度器下所有进程共享的全局状态。
/// 名字不区分大小写，统一以大写存储。
#[derive(Default)]
pub struct Environment {
    globals: FxHashMap<String, Value>,
    lookup: Option<Box<dyn NameLookup>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lookup(&mut self, lookup: Box<dyn NameLookup>) {
        self.lookup = Some(lookup);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let key = name.to_ascii_uppercase();
        match self.globals.get(&key) {
            Some(value) => Some(value.clone()),
            None => self.lookup.as_ref().and_then(|l| l.lookup(&key)),
        }
    }

    /// 存入 `value` 的独立副本。
    pub fn set(&mut self, name: &str, value: &Value) {
        self.globals.insert(name.to_ascii_uppercase(), value.clone_of());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(&name.to_ascii_uppercase())
    }

    pub fn define_native(&mut self, native: NativeFunction) {
        let name = crate::types::callable::Callable::name(&native).to_ascii_uppercase();
        self.globals.insert(name, native.into_value());
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::value::make_integer_value;

    struct Session;

    impl NameLookup for Session {
        fn lookup(&self, name: &str) -> Option<Value> {
            (name == "TURN").then(|| make_integer_value(42))
        }
    }

    #[test]
    fn test_globals_are_case_insensitive() {
        let mut env = Environment::new();
        env.set("Fuel", &make_integer_value(3));
        assert_eq!(env.get("FUEL"), Some(make_integer_value(3)));
        assert!(env.get("turn").is_none());
        env.set_lookup(Box::new(Session));
        assert_eq!(env.get("turn"), Some(make_integer_value(42)));
        assert_eq!(env.remove("fuel"), Some(make_integer_value(3)));
        assert!(env.is_empty());
    }
}
