//! 字符串在存档中的字节编码。
//!
//! 编解码器不直接假定 UTF-8，而是由调用方注入 `Charset`。

use encoding_rs::Encoding;

pub trait Charset {
    fn name(&self) -> &str;
    fn encode(&self, text: &str) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Charset;

impl Charset for Utf8Charset {
    fn name(&self) -> &str {
        "utf-8"
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// 基于 `encoding_rs` 的单字节旧式代码页。
#[derive(Debug, Clone, Copy)]
pub struct CodepageCharset {
    encoding: &'static Encoding,
}

impl CodepageCharset {
    pub fn from_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.as_bytes()).map(|encoding| CodepageCharset { encoding })
    }
}

impl Charset for CodepageCharset {
    fn name(&self) -> &str {
        self.encoding.name()
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        // 不可表示的字符会被替换为数字字符引用
        let (bytes, _, _) = self.encoding.encode(text);
        bytes.into_owned()
    }

    fn decode(&self, bytes: &[u8]) -> String {
        let (text, _) = self.encoding.decode_without_bom_handling(bytes);
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codepage_round_trip() {
        let cs = CodepageCharset::from_label("windows-1252").unwrap();
        let bytes = cs.encode("Zoë");
        assert_eq!(bytes, vec![b'Z', b'o', 0xEB]);
        assert_eq!(cs.decode(&bytes), "Zoë");
    }

    #[test]
    fn test_utf8() {
        assert_eq!(Utf8Charset.encode("Zoë").len(), 4);
        assert_eq!(Utf8Charset.decode("Zoë".as_bytes()), "Zoë");
    }
}
