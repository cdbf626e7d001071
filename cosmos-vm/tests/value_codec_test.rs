use cosmos_vm::{
    types::Value,
    vmio::{NullLoadContext, NullSaveContext, SaveVisitor, TagNode, Utf8Charset, ValueLoader},
};

/// Reals produced by the legacy 48-bit format, with their `%.10f` rendering.
/// The first half are round numbers, the second half random byte patterns.
const REALS: &[([u8; 6], &str)] = &[
    ([0x00, 0x00, 0x00, 0x00, 0x00, 0x00], "0.0000000000"),
    ([0x81, 0x00, 0x00, 0x00, 0x00, 0x00], "1.0000000000"),
    ([0x82, 0x00, 0x00, 0x00, 0x00, 0x00], "2.0000000000"),
    ([0x82, 0x00, 0x00, 0x00, 0x00, 0x40], "3.0000000000"),
    ([0x83, 0x00, 0x00, 0x00, 0x00, 0x00], "4.0000000000"),
    ([0x83, 0x00, 0x00, 0x00, 0x00, 0x20], "5.0000000000"),
    ([0x83, 0x00, 0x00, 0x00, 0x00, 0x40], "6.0000000000"),
    ([0x83, 0x00, 0x00, 0x00, 0x00, 0x60], "7.0000000000"),
    ([0x84, 0x00, 0x00, 0x00, 0x00, 0x00], "8.0000000000"),
    ([0x84, 0x00, 0x00, 0x00, 0x00, 0x10], "9.0000000000"),
    ([0x84, 0x00, 0x00, 0x00, 0x00, 0x20], "10.0000000000"),
    ([0x87, 0x00, 0x00, 0x00, 0x00, 0x48], "100.0000000000"),
    ([0x8A, 0x00, 0x00, 0x00, 0x00, 0x7A], "1000.0000000000"),
    ([0x8E, 0x00, 0x00, 0x00, 0x40, 0x1C], "10000.0000000000"),
    ([0x91, 0x00, 0x00, 0x00, 0x50, 0x43], "100000.0000000000"),
    ([0x94, 0x00, 0x00, 0x00, 0x24, 0x74], "1000000.0000000000"),
    ([0x98, 0x00, 0x00, 0x80, 0x96, 0x18], "10000000.0000000000"),
    ([0x9B, 0x00, 0x00, 0x20, 0xBC, 0x3E], "100000000.0000000000"),
    ([0x9E, 0x00, 0x00, 0x28, 0x6B, 0x6E], "1000000000.0000000000"),
    ([0xA2, 0x00, 0x00, 0xF9, 0x02, 0x15], "10000000000.0000000000"),
    ([0xA5, 0x00, 0x40, 0xB7, 0x43, 0x3A], "100000000000.0000000000"),
    ([0x9B, 0x00, 0xA0, 0xA2, 0x79, 0x6B], "123456789.0000000000"),
    ([0x80, 0x66, 0x66, 0x66, 0x66, 0x66], "0.9000000000"),
    ([0x80, 0xCD, 0xCC, 0xCC, 0xCC, 0x4C], "0.8000000000"),
    ([0x80, 0x33, 0x33, 0x33, 0x33, 0x33], "0.7000000000"),
    ([0x80, 0x9A, 0x99, 0x99, 0x99, 0x19], "0.6000000000"),
    ([0x80, 0x00, 0x00, 0x00, 0x00, 0x00], "0.5000000000"),
    ([0x7F, 0xCD, 0xCC, 0xCC, 0xCC, 0x4C], "0.4000000000"),
    ([0x7F, 0x9A, 0x99, 0x99, 0x99, 0x19], "0.3000000000"),
    ([0x7E, 0xCD, 0xCC, 0xCC, 0xCC, 0x4C], "0.2000000000"),
    ([0x7D, 0xCD, 0xCC, 0xCC, 0xCC, 0x4C], "0.1000000000"),
    ([0x7A, 0x71, 0x3D, 0x0A, 0xD7, 0x23], "0.0100000000"),
    ([0x77, 0x8D, 0x97, 0x6E, 0x12, 0x03], "0.0010000000"),
    ([0x73, 0xE2, 0x58, 0x17, 0xB7, 0x51], "0.0001000000"),
    ([0x70, 0x1B, 0x47, 0xAC, 0xC5, 0x27], "0.0000100000"),
    ([0x6D, 0xAF, 0x05, 0xBD, 0x37, 0x06], "0.0000010000"),
    ([0x69, 0xE5, 0xD5, 0x94, 0xBF, 0x56], "0.0000001000"),
    ([0x66, 0x84, 0x11, 0x77, 0xCC, 0x2B], "0.0000000100"),
    ([0x63, 0x37, 0x41, 0x5F, 0x70, 0x09], "0.0000000010"),
    ([0x5F, 0xBE, 0xCE, 0xFE, 0xE6, 0x5B], "0.0000000001"),
    ([0x81, 0x00, 0x00, 0x00, 0x00, 0x80], "-1.0000000000"),
    ([0x82, 0x00, 0x00, 0x00, 0x00, 0x80], "-2.0000000000"),
    ([0x82, 0x00, 0x00, 0x00, 0x00, 0xC0], "-3.0000000000"),
    ([0x83, 0x00, 0x00, 0x00, 0x00, 0x80], "-4.0000000000"),
    ([0x83, 0x00, 0x00, 0x00, 0x00, 0xA0], "-5.0000000000"),
    ([0x83, 0x00, 0x00, 0x00, 0x00, 0xC0], "-6.0000000000"),
    ([0x83, 0x00, 0x00, 0x00, 0x00, 0xE0], "-7.0000000000"),
    ([0x84, 0x00, 0x00, 0x00, 0x00, 0x80], "-8.0000000000"),
    ([0x84, 0x00, 0x00, 0x00, 0x00, 0x90], "-9.0000000000"),
    ([0x84, 0x00, 0x00, 0x00, 0x00, 0xA0], "-10.0000000000"),
    ([0x87, 0x00, 0x00, 0x00, 0x00, 0xC8], "-100.0000000000"),
    ([0x8A, 0x00, 0x00, 0x00, 0x00, 0xFA], "-1000.0000000000"),
    ([0x8E, 0x00, 0x00, 0x00, 0x40, 0x9C], "-10000.0000000000"),
    ([0x91, 0x00, 0x00, 0x00, 0x50, 0xC3], "-100000.0000000000"),
    ([0x94, 0x00, 0x00, 0x00, 0x24, 0xF4], "-1000000.0000000000"),
    ([0x98, 0x00, 0x00, 0x80, 0x96, 0x98], "-10000000.0000000000"),
    ([0x9B, 0x00, 0x00, 0x20, 0xBC, 0xBE], "-100000000.0000000000"),
    ([0x9E, 0x00, 0x00, 0x28, 0x6B, 0xEE], "-1000000000.0000000000"),
    ([0xA2, 0x00, 0x00, 0xF9, 0x02, 0x95], "-10000000000.0000000000"),
    ([0xA5, 0x00, 0x40, 0xB7, 0x43, 0xBA], "-100000000000.0000000000"),
    ([0x9B, 0x00, 0xA0, 0xA2, 0x79, 0xEB], "-123456789.0000000000"),
    ([0x80, 0x66, 0x66, 0x66, 0x66, 0xE6], "-0.9000000000"),
    ([0x80, 0xCD, 0xCC, 0xCC, 0xCC, 0xCC], "-0.8000000000"),
    ([0x80, 0x33, 0x33, 0x33, 0x33, 0xB3], "-0.7000000000"),
    ([0x80, 0x9A, 0x99, 0x99, 0x99, 0x99], "-0.6000000000"),
    ([0x80, 0x00, 0x00, 0x00, 0x00, 0x80], "-0.5000000000"),
    ([0x7F, 0xCD, 0xCC, 0xCC, 0xCC, 0xCC], "-0.4000000000"),
    ([0x7F, 0x9A, 0x99, 0x99, 0x99, 0x99], "-0.3000000000"),
    ([0x7E, 0xCD, 0xCC, 0xCC, 0xCC, 0xCC], "-0.2000000000"),
    ([0x7D, 0xCD, 0xCC, 0xCC, 0xCC, 0xCC], "-0.1000000000"),
    ([0x7A, 0x71, 0x3D, 0x0A, 0xD7, 0xA3], "-0.0100000000"),
    ([0x77, 0x8D, 0x97, 0x6E, 0x12, 0x83], "-0.0010000000"),
    ([0x73, 0xE2, 0x58, 0x17, 0xB7, 0xD1], "-0.0001000000"),
    ([0x70, 0x1B, 0x47, 0xAC, 0xC5, 0xA7], "-0.0000100000"),
    ([0x6D, 0xAF, 0x05, 0xBD, 0x37, 0x86], "-0.0000010000"),
    ([0x69, 0xE5, 0xD5, 0x94, 0xBF, 0xD6], "-0.0000001000"),
    ([0x66, 0x84, 0x11, 0x77, 0xCC, 0xAB], "-0.0000000100"),
    ([0x63, 0x37, 0x41, 0x5F, 0x70, 0x89], "-0.0000000010"),
    ([0x5F, 0xBE, 0xCE, 0xFE, 0xE6, 0xDB], "-0.0000000001"),
    ([0x51, 0x29, 0x5F, 0x6C, 0x14, 0x79], "0.0000000000"),
    ([0x12, 0xD7, 0x0F, 0x4B, 0xEA, 0x5E], "0.0000000000"),
    ([0xC6, 0x53, 0xB2, 0xD8, 0xB7, 0x4E], "953319203389407494144.0000000000"),
    ([0x29, 0x54, 0x77, 0x3F, 0xD3, 0x47], "0.0000000000"),
    ([0x7B, 0x26, 0xDF, 0x49, 0xC5, 0xF9], "-0.0304895823"),
    ([0x7E, 0xE3, 0xD3, 0x05, 0x24, 0x24], "0.1602936659"),
    ([0x80, 0x05, 0x97, 0x02, 0xC6, 0xA6], "-0.6514588946"),
    ([0x15, 0xC5, 0x7E, 0xE1, 0x82, 0x92], "-0.0000000000"),
    ([0x47, 0xE0, 0x29, 0x45, 0x8B, 0xF5], "-0.0000000000"),
    ([0x2C, 0x28, 0x44, 0x2D, 0x93, 0x7F], "0.0000000000"),
    ([0x49, 0x27, 0x9C, 0xBD, 0xBF, 0x14], "0.0000000000"),
    ([0x13, 0x0F, 0x1B, 0xCB, 0xCE, 0x61], "0.0000000000"),
    ([0x9C, 0x6F, 0xBD, 0x7E, 0x57, 0xD1], "-219510763.8395996094"),
    ([0x50, 0x50, 0xA8, 0xB1, 0xE7, 0x51], "0.0000000000"),
    ([0x7A, 0x4B, 0xC4, 0xBD, 0x8D, 0xB9], "-0.0113252977"),
    ([0x69, 0x8A, 0x98, 0xE1, 0xAB, 0x1C], "0.0000000730"),
    ([0x78, 0x67, 0x1D, 0x0D, 0x8C, 0xAC], "-0.0026328594"),
    ([0x14, 0xEB, 0xD6, 0xAE, 0xED, 0x46], "0.0000000000"),
    ([0x1A, 0xDD, 0x8D, 0xB2, 0x19, 0xAB], "-0.0000000000"),
    ([0x04, 0x4F, 0xE7, 0x89, 0x53, 0x71], "0.0000000000"),
    ([0x67, 0x35, 0xCE, 0x96, 0x1C, 0x9F], "-0.0000000185"),
    ([0x65, 0x5D, 0x15, 0x74, 0x81, 0x75], "0.0000000071"),
    ([0x5C, 0x5D, 0x9F, 0xC7, 0x74, 0x34], "0.0000000000"),
    ([0x44, 0x4B, 0xB3, 0x74, 0xF6, 0x30], "0.0000000000"),
    ([0x03, 0x39, 0xE6, 0x52, 0xDC, 0xC3], "-0.0000000000"),
    ([0x0D, 0x81, 0x6C, 0x00, 0x26, 0xB5], "-0.0000000000"),
    ([0x4F, 0x65, 0x8C, 0x42, 0x26, 0x4B], "0.0000000000"),
    ([0x13, 0xB4, 0x54, 0xCA, 0xA7, 0x90], "-0.0000000000"),
    ([0xE5, 0x05, 0x41, 0xE2, 0xAF, 0x08], "1353682937867496664104723021824.0000000000"),
    ([0x28, 0x27, 0x69, 0x6B, 0x24, 0x00], "0.0000000000"),
];

fn load(node: TagNode, aux: &mut &[u8]) -> Value {
    let mut ctx = NullLoadContext;
    ValueLoader::new(&Utf8Charset, &mut ctx).load_value(node, aux).unwrap()
}

fn save(value: &Value) -> (TagNode, Vec<u8>) {
    let mut ctx = NullSaveContext;
    let mut aux = Vec::new();
    let node = SaveVisitor::new(&Utf8Charset, &mut ctx).save(value, &mut aux).unwrap();
    (node, aux)
}

#[test]
fn test_legacy_reals() {
    for (bytes, expected) in REALS {
        let node = TagNode::from_bytes(*bytes);
        let value = load(node, &mut &[][..]);
        let Value::Float(f) = &value else {
            panic!("{}: decoded to {:?}", expected, value);
        };
        assert_eq!(format!("{:.10}", f), *expected, "bytes {:02X?}", bytes);

        let (out, aux) = save(&value);
        assert!(aux.is_empty(), "{}", expected);
        assert_eq!(out, node, "{}", expected);
    }
}

#[test]
fn test_real_limits() {
    let (node, _) = save(&Value::Float(1.0e-100));
    assert_eq!(node, TagNode::new(0, 0));

    let (node, _) = save(&Value::Float(1.0e100));
    assert_eq!(node, TagNode::new(0xFFFF, 0x7FFF_FFFF));

    let (node, _) = save(&Value::Float(7.0));
    assert_eq!(node, TagNode::new(0x0083, 0x6000_0000));
}

#[test]
fn test_integers_and_booleans() {
    let nodes = [
        TagNode::new(TagNode::TAG_INTEGER, 4711),
        TagNode::new(TagNode::TAG_INTEGER, -9_999_999i32 as u32),
        TagNode::new(TagNode::TAG_INTEGER, 0),
        TagNode::new(TagNode::TAG_BOOLEAN, 0),
        TagNode::new(TagNode::TAG_BOOLEAN, 1),
    ];
    let values: Vec<Value> = nodes.iter().map(|n| load(*n, &mut &[][..])).collect();

    assert!(matches!(values[0], Value::Integer(4711)));
    assert!(matches!(values[1], Value::Integer(-9_999_999)));
    assert!(matches!(values[2], Value::Integer(0)));
    assert!(matches!(values[3], Value::Boolean(false)));
    assert!(matches!(values[4], Value::Boolean(true)));

    for (value, node) in values.iter().zip(nodes) {
        let (out, aux) = save(value);
        assert!(aux.is_empty());
        assert_eq!(out, node);
    }
}

#[test]
fn test_load_segment() {
    #[rustfmt::skip]
    let data: &[u8] = &[
        0, 0, 0, 0, 0, 0,
        0, 2, 5, 4, 0, 0,
        0, 1, 0, 0, 0, 0,
        0, 4, 0, 0, 0, 0,
        0, 3, 1, 0, 0, 0,
        0, 6, 7, 0, 0, 0,
        0, 4, 0, 0, 1, 0,
        0x83, 0, 0, 0, 0, 0x20,
        0, 5, 0, 0, 0x40, 0x40,
        b'a', b'b', b'c', b'd', b'e', b'f', b'g',
        3, b'X', b'Y', b'Z',
        b'1', b'2', b'3',
    ];
    let mut reader = data;
    let mut segment = Vec::new();
    let mut ctx = NullLoadContext;
    ValueLoader::new(&Utf8Charset, &mut ctx)
        .load_segment(&mut reader, &mut segment, 0, 9)
        .unwrap();

    assert_eq!(data.len() - reader.len(), 65);
    assert_eq!(segment.len(), 9);
    assert!(matches!(segment[0], Value::Float(f) if f == 0.0));
    assert!(matches!(segment[1], Value::Integer(1029)));
    assert!(segment[2].is_null());
    assert_eq!(segment[3].as_str(), Some(""));
    assert!(matches!(segment[4], Value::Boolean(true)));
    assert_eq!(segment[5].as_str(), Some("abcdefg"));
    assert_eq!(segment[6].as_str(), Some("XYZ"));
    assert!(matches!(segment[7], Value::Float(f) if f == 5.0));
    assert!(matches!(segment[8], Value::Float(f) if f == 3.0));
}

#[test]
fn test_load_segment_at_offset() {
    let data: &[u8] = &[0, 2, 5, 4, 0, 0, 0, 1, 0, 0, 0, 0];
    let mut reader = data;
    let mut segment = vec![Value::Null, Value::Null, Value::Integer(42), Value::Integer(23)];
    let mut ctx = NullLoadContext;
    ValueLoader::new(&Utf8Charset, &mut ctx)
        .load_segment(&mut reader, &mut segment, 1, 2)
        .unwrap();

    assert!(reader.is_empty());
    assert_eq!(segment.len(), 4);
    assert!(segment[0].is_null());
    assert!(matches!(segment[1], Value::Integer(1029)));
    assert!(segment[2].is_null());
    assert!(matches!(segment[3], Value::Integer(23)));
}

#[test]
fn test_segment_save_load() {
    let values = vec![
        Value::Integer(-3),
        Value::from("hello"),
        Value::Null,
        Value::Float(0.25),
        Value::Boolean(true),
        Value::from("x".repeat(400).as_str()),
    ];
    let mut data = Vec::new();
    let mut save_ctx = NullSaveContext;
    SaveVisitor::new(&Utf8Charset, &mut save_ctx)
        .save_segment(&mut data, &values)
        .unwrap();

    let mut reader = &data[..];
    let mut loaded = Vec::new();
    let mut load_ctx = NullLoadContext;
    ValueLoader::new(&Utf8Charset, &mut load_ctx)
        .load_segment(&mut reader, &mut loaded, 0, values.len())
        .unwrap();
    assert!(reader.is_empty());
    assert_eq!(loaded.len(), values.len());
    assert!(loaded[2].is_null());
    for i in [0, 1, 3, 4, 5] {
        assert_eq!(loaded[i], values[i]);
    }
}
