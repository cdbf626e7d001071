//! 旧式 48 位实数与 f64 之间的转换。
//!
//! 布局（6 字节）：
//! - 字节 0：指数，偏置 129；0 表示数值 0。
//! - 字节 1..5：39 位尾数（隐含最高位 1），低位在前。
//! - 字节 5 的最高位：符号位。
//!
//! 按 `TagNode` 解释时，指数和尾数最低 8 位落在 `tag` 中，其余落在 `value` 中。
//! `tag == 0xFFFF` 且 `value` 低 31 位全为 1 表示溢出（无穷大）。

use super::tag::TagNode;

const EXP_BIAS: i64 = 129;
const F64_BIAS: i64 = 1023;
const MANTISSA_BITS: u32 = 39;
const DROPPED_BITS: u32 = 52 - MANTISSA_BITS;

const SENTINEL_TAG: u16 = 0xFFFF;
const SENTINEL_VALUE: u32 = 0x7FFF_FFFF;

/// 解码 48 位实数。除溢出标记外，所有位模式都能精确转换。
///
/// # 参数
/// - `node`: 低字节为指数的标签节点
///
/// # 返回
/// 对应的 `f64`；溢出标记解码为带符号的无穷大
pub fn decode_real(node: TagNode) -> f64 {
    let exponent = (node.tag & 0xFF) as i64;
    let negative = node.value & 0x8000_0000 != 0;
    if exponent == 0 {
        return 0.0;
    }
    if node.tag == SENTINEL_TAG && node.value & SENTINEL_VALUE == SENTINEL_VALUE {
        return if negative { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let mantissa = (((node.value & 0x7FFF_FFFF) as u64) << 8) | (node.tag >> 8) as u64;
    let biased = (exponent - EXP_BIAS + F64_BIAS) as u64;
    let bits = ((negative as u64) << 63) | (biased << 52) | (mantissa << DROPPED_BITS);
    f64::from_bits(bits)
}

/// 把 `value` 编码为 48 位实数，尾数按就近舍入（平局取偶）。
///
/// 过大的数编码为溢出标记，过小的数编码为 0，NaN 存为 0。
pub fn encode_real(value: f64) -> TagNode {
    if value.is_nan() {
        return TagNode::default();
    }
    let bits = value.to_bits();
    let negative = bits >> 63 != 0;
    if value.is_infinite() {
        return sentinel(negative);
    }
    let mut exponent = ((bits >> 52) & 0x7FF) as i64;
    if exponent == 0 {
        // zero or subnormal: far below the 48-bit range
        return TagNode::default();
    }

    let fraction = bits & ((1u64 << 52) - 1);
    let mut mantissa = fraction >> DROPPED_BITS;
    let rest = fraction & ((1u64 << DROPPED_BITS) - 1);
    let half = 1u64 << (DROPPED_BITS - 1);
    if rest > half || (rest == half && mantissa & 1 == 1) {
        mantissa += 1;
        if mantissa == 1u64 << MANTISSA_BITS {
            mantissa = 0;
            exponent += 1;
        }
    }

    let exponent = exponent - F64_BIAS + EXP_BIAS;
    if exponent < 1 {
        return TagNode::default();
    }
    if exponent > 255 {
        return sentinel(negative);
    }
    TagNode {
        tag: exponent as u16 | (((mantissa & 0xFF) as u16) << 8),
        value: ((negative as u32) << 31) | (mantissa >> 8) as u32,
    }
}

fn sentinel(negative: bool) -> TagNode {
    TagNode {
        tag: SENTINEL_TAG,
        value: ((negative as u32) << 31) | SENTINEL_VALUE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(bytes: [u8; 6]) -> TagNode {
        TagNode::from_bytes(bytes)
    }

    #[test]
    fn test_known_values() {
        assert_eq!(decode_real(node([0x81, 0, 0, 0, 0, 0])), 1.0);
        assert_eq!(decode_real(node([0x83, 0, 0, 0, 0, 0x60])), 7.0);
        assert_eq!(decode_real(node([0x83, 0, 0, 0, 0, 0xE0])), -7.0);
        assert_eq!(encode_real(7.0), TagNode::new(0x0083, 0x6000_0000));
        assert_eq!(encode_real(-0.5), TagNode::new(0x0080, 0x8000_0000));
    }

    #[test]
    fn test_zero_and_limits() {
        assert_eq!(decode_real(TagNode::default()), 0.0);
        assert_eq!(decode_real(TagNode::new(0xFF00, 0x8000_1234)), 0.0);
        assert_eq!(encode_real(0.0), TagNode::default());
        assert_eq!(encode_real(-0.0), TagNode::default());
        assert_eq!(encode_real(1.0e-100), TagNode::default());
        assert_eq!(encode_real(f64::NAN), TagNode::default());
        assert_eq!(encode_real(1.0e100), TagNode::new(0xFFFF, 0x7FFF_FFFF));
        assert_eq!(encode_real(-1.0e100), TagNode::new(0xFFFF, 0xFFFF_FFFF));
        assert_eq!(encode_real(f64::INFINITY), TagNode::new(0xFFFF, 0x7FFF_FFFF));
        assert_eq!(decode_real(TagNode::new(0xFFFF, 0x7FFF_FFFF)), f64::INFINITY);
        assert_eq!(decode_real(TagNode::new(0xFFFF, 0xFFFF_FFFF)), f64::NEG_INFINITY);
    }

    #[test]
    fn test_rounding() {
        // 1 + 2^-40 is exactly half way between two 39-bit mantissas: ties to even
        assert_eq!(encode_real(1.0 + 2f64.powi(-40)), encode_real(1.0));
        // 1 + 3 * 2^-40 rounds up to 1 + 2^-38
        assert_eq!(encode_real(1.0 + 3.0 * 2f64.powi(-40)), encode_real(1.0 + 2f64.powi(-38)));
        // all-ones mantissa rounding up carries into the exponent
        let almost_two = 2.0 - 2f64.powi(-45);
        assert_eq!(encode_real(almost_two), encode_real(2.0));
    }
}
