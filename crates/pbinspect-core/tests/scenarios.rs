//! End-to-end inspection and decoding scenarios.

use pbinspect_core::schema::{Field, FieldDef, FieldType};
use pbinspect_core::{Decoder, DecoderConfig, Error, Inspector, MessageDef, SchemaStore, Value};
use pretty_assertions::assert_eq;
use prost::Message;
use prost_types::FileDescriptorSet;

/// int32=1, int64=2, float=1.0, double=4.0, uint32=5, uint64=6, bool=true,
/// bytes="haha", string="hello world" at tags 1 to 9
const SCALARS: &[u8] = &[
    0x08, 0x01, 0x10, 0x02, 0x1D, 0x00, 0x00, 0x80, 0x3F, 0x21, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x10, 0x40, 0x28, 0x05, 0x30, 0x06, 0x38, 0x01, 0x42, 0x04, 0x68, 0x61, 0x68, 0x61,
    0x4A, 0x0B, 0x68, 0x65, 0x6C, 0x6C, 0x6F, 0x20, 0x77, 0x6F, 0x72, 0x6C, 0x64,
];

const SCALARS_PROTO: &str = r#"
    syntax = "proto3";
    package test;

    message Test {
        int32 int32_value = 1;
        int64 int64_value = 2;
        float float_value = 3;
        double double_value = 4;
        uint32 uint32_value = 5;
        uint64 uint64_value = 6;
        bool bool_value = 7;
        bytes bytes_value = 8;
        string string_value = 9;
    }
"#;

#[test]
fn schema_less_listing() {
    let mut out = String::new();
    let summary = Inspector::new().inspect_text(SCALARS, &mut out).unwrap();

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        vec![
            "  0: t=  1 varint 1",
            "  2: t=  2 varint 2",
            "  4: t=  3 fix32 1065353216",
            "  9: t=  4 fix64 4616189618054758400",
            " 18: t=  5 varint 5",
            " 20: t=  6 varint 6",
            " 22: t=  7 varint 1",
            " 24: t=  8 bytes [4] 68 61 68 61",
            " 30: t=  9 bytes [11] 68 65 6c .. 72 6c 64",
        ]
    );
    assert!(summary.is_balanced());
}

#[test]
fn schema_driven_decode_from_source() {
    let mut store = SchemaStore::new();
    store.read_source("test.proto", SCALARS_PROTO).unwrap();
    assert_eq!(store.package_of("test.proto"), Some("test"));

    let fields = Decoder::new(&store).decode("test", "Test", SCALARS).unwrap();
    let json = serde_json::to_value(&fields).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "int32_value": 1,
            "int64_value": 2,
            "float_value": 1.0,
            "double_value": 4.0,
            "uint32_value": 5,
            "uint64_value": 6,
            "bool_value": true,
            "bytes_value": [104, 97, 104, 97],
            "string_value": "hello world",
        })
    );
}

#[test]
fn schema_driven_decode_from_registered_message() {
    let test = ["int32", "int64", "float", "double", "uint32", "uint64", "bool", "bytes", "string"]
        .iter()
        .zip(1..)
        .fold(MessageDef::new("test", "Test"), |msg, (ty, number)| {
            msg.with_field(FieldDef::Normal(Field::new(*ty, FieldType::parse(ty), number)))
        });

    let mut store = SchemaStore::new();
    assert!(store.register_message(test.clone()));
    assert!(!store.register_message(test));

    let fields = Decoder::new(&store).decode("test", "Test", SCALARS).unwrap();
    assert_eq!(fields.len(), 9);
    assert_eq!(fields.get("float"), Some(&Value::F32(1.0)));
    assert_eq!(fields.get("double"), Some(&Value::F64(4.0)));
    assert_eq!(fields.get("string"), Some(&Value::String("hello world".into())));
}

#[test]
fn decode_from_descriptor_set() {
    let file = protox_parse::parse("test.proto", SCALARS_PROTO).unwrap();
    let set = FileDescriptorSet { file: vec![file] };

    let mut store = SchemaStore::new();
    store
        .read_descriptor_set("scalars.desc", &set.encode_to_vec())
        .unwrap();
    assert!(store.has_source("scalars.desc"));

    let fields = Decoder::new(&store).decode("test", "Test", SCALARS).unwrap();
    assert_eq!(fields.get("uint64_value"), Some(&Value::U64(6)));
}

#[test]
fn corrupt_descriptor_set_is_an_error() {
    let mut store = SchemaStore::new();
    let err = store
        .read_descriptor_set("bad.desc", &[0x0A, 0x05, 0x01])
        .unwrap_err();
    assert!(matches!(err, Error::DescriptorDecode(_)));
    assert!(!store.has_source("bad.desc"));
}

#[test]
fn nested_schema_with_maps_and_enums() {
    let mut store = SchemaStore::new();
    store
        .read_source(
            "shop.proto",
            r#"
            syntax = "proto3";
            package shop.v1;

            enum Currency {
                EUR = 0;
                USD = 1;
            }

            message Money {
                Currency currency = 1;
                sint64 cents = 2;
            }

            message Order {
                message Line {
                    string sku = 1;
                    Money price = 2;
                }
                uint64 id = 1;
                repeated Line lines = 2;
                map<int32, string> notes = 3;
            }
            "#,
        )
        .unwrap();

    let order = [
        0x08, 0x2A, // id = 42
        0x12, 0x09, // lines
        0x0A, 0x01, b'a', // sku = "a"
        0x12, 0x04, 0x08, 0x01, 0x10, 0x03, // price = { USD, -2 }
        0x1A, 0x05, 0x08, 0x02, 0x12, 0x01, b'n', // notes { 2: "n" }
    ];

    let fields = Decoder::new(&store).decode("shop.v1", "Order", &order).unwrap();
    let json = serde_json::to_value(&fields).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": 42,
            "lines": [
                { "sku": "a", "price": { "currency": "USD", "cents": -2 } }
            ],
            "notes": { "2 (int32)": "n" }
        })
    );

    let names: Vec<_> = store
        .messages_in_package("shop.v1")
        .into_iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(names, vec!["Money", "Order", "Order.Line"]);

    assert!(store.lookup_message("shop.v1", "Order.Line").is_some());
    assert!(store.lookup_message("shop.v1", "Line").is_none());
    let err = Decoder::new(&store).decode("shop.v1", "Line", &[]).unwrap_err();
    assert!(matches!(err, Error::UnknownType { ref name } if name == "shop.v1.Line"));
}

#[test]
fn strict_mode_rejects_truncated_tags_only() {
    let mut store = SchemaStore::new();
    store.read_source("test.proto", SCALARS_PROTO).unwrap();

    let mut truncated = SCALARS.to_vec();
    truncated.push(0xFF);

    let lenient = Decoder::new(&store).decode("test", "Test", &truncated).unwrap();
    assert_eq!(lenient.len(), 9);

    let strict = Decoder::with_config(&store, DecoderConfig::new().strict(true));
    assert!(strict.decode("test", "Test", SCALARS).is_ok());
    let err = strict.decode("test", "Test", &truncated).unwrap_err();
    assert_eq!(err.offset(), Some(SCALARS.len()));
}

#[test]
fn shared_store_across_threads() {
    let mut store = SchemaStore::new();
    store.read_source("test.proto", SCALARS_PROTO).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| Decoder::new(&store).decode("test", "Test", SCALARS)))
            .collect();
        for handle in handles {
            let fields = handle.join().unwrap().unwrap();
            assert_eq!(fields.get("int32_value"), Some(&Value::I32(1)));
        }
    });
}
