//! 虚拟机运行参数。
//!
//! 所有字段都有默认值，因此空的 TOML 文档即为默认配置。

use serde::{Deserialize, Serialize};

use crate::{
    error::VmError,
    vmio::charset::{Charset, CodepageCharset, Utf8Charset},
};

/// 对象文件加载器遇到格式错误记录时的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// 第一条格式错误的记录即终止整个加载。
    #[default]
    Strict,
    /// 格式错误的记录记入日志与报告后跳过。
    SkipMalformed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_stack_size: usize,
    pub load_policy: LoadPolicy,
    pub charset: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_stack_size: 10_000,
            load_policy: LoadPolicy::Strict,
            charset: "utf-8".to_string(),
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, VmError> {
        toml::from_str(text).map_err(|e| VmError::format(format!("configuration: {}", e)))
    }

    /// 根据 `charset` 标签构造字符集。
    pub fn make_charset(&self) -> Result<Box<dyn Charset>, VmError> {
        let label = self.charset.trim();
        if label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8") {
            return Ok(Box::new(Utf8Charset));
        }
        CodepageCharset::from_label(label)
            .map(|cs| Box::new(cs) as Box<dyn Charset>)
            .ok_or_else(|| VmError::format(format!("unknown character set '{}'", label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = VmConfig::from_toml_str("").unwrap();
        assert_eq!(config, VmConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = VmConfig::from_toml_str(
            "max_call_depth = 12\nload_policy = \"skip_malformed\"\ncharset = \"windows-1252\"\n",
        )
        .unwrap();
        assert_eq!(config.max_call_depth, 12);
        assert_eq!(config.max_stack_size, 10_000);
        assert_eq!(config.load_policy, LoadPolicy::SkipMalformed);
        assert_eq!(config.make_charset().unwrap().name(), "windows-1252");
    }

    #[test]
    fn test_bad_documents() {
        assert!(VmConfig::from_toml_str("max_call_depth = \"deep\"").is_err());
        let config = VmConfig {
            charset: "klingon".into(),
            ..VmConfig::default()
        };
        assert!(config.make_charset().is_err());
    }
}
