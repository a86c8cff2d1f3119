//! JSON to protobuf encoding, including byte-exact round trips of canonical
//! payloads.

use base64::Engine as _;
use protoscribe_engine::{EncodeError, SchemaContext};
use serde_json::json;

fn b64(data: &str) -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .expect("test payload is valid base64")
}

fn context_with(unit: &str) -> SchemaContext {
    let mut context = SchemaContext::new();
    context.add_unit("test", unit).unwrap();
    context
}

fn single_field(field_type: &str) -> SchemaContext {
    context_with(&format!(
        "syntax = \"proto3\";\nmessage test {{ {field_type} data = 1; }}"
    ))
}

#[test]
fn test_canonical_payloads_round_trip() {
    let cases = [
        ("bool", "CAE="),
        ("int32", "CAc="),
        ("uint64", "CAc="),
        ("float", "DZqZ+UA="),
        ("double", "CTMzMzMzMx9A"),
        ("string", "CgV2YWx1ZQ=="),
        ("repeated bool", "CgMBAAE="),
        ("repeated int32", "CgMHCAk="),
        ("repeated float", "CgyamflAZmYOQQAAEEE="),
        ("repeated double", "ChgzMzMzMzMfQM3MzMzMzCFAAAAAAAAAIkA="),
        ("repeated string", "CgFBCgFCCgFD"),
        ("map<string, int32>", "CgUKAUEQAQoFCgFCEAIKBQoBQxAD"),
    ];

    for (field_type, data) in cases {
        let context = single_field(field_type);
        let payload = b64(data);
        let json = context.decode("test", &payload).unwrap();
        assert_eq!(
            context.encode("test", &json).unwrap(),
            payload,
            "field type {field_type}"
        );
    }
}

#[test]
fn test_encode_imported_enum() {
    let mut context = SchemaContext::new();
    context
        .add_unit(
            "diet.proto",
            "syntax = \"proto3\"; enum Diet { carnivorous = 0; herbivorous = 1; }",
        )
        .unwrap();
    context
        .add_unit(
            "animal.proto",
            r#"
            syntax = "proto3";
            import "diet.proto";
            message Animal {
                string name = 1;
                Diet diet = 2;
                double length = 3;
            }
            "#,
        )
        .unwrap();

    let expected = b64("CglJZ3Vhbm9kb24QARkAAAAAAAAkQA==");
    let in_order = r#"{"name": "Iguanodon", "diet": "herbivorous", "length": 10}"#;
    let shuffled = r#"{"length": 10.0, "diet": 1, "name": "Iguanodon"}"#;
    assert_eq!(context.encode("Animal", in_order).unwrap(), expected);
    assert_eq!(context.encode("Animal", shuffled).unwrap(), expected);
}

#[test]
fn test_nested_and_repeated_messages() {
    let context = context_with(
        r#"
        syntax = "proto3";
        message nested { int32 data = 1; }
        message test {
            nested one = 1;
            repeated nested many = 2;
        }
        "#,
    );
    let value = json!({ "one": { "data": 7 }, "many": [{ "data": 8 }, {}] });
    let bytes = context.encode_value("test", &value).unwrap();
    assert_eq!(
        bytes,
        [0x0a, 0x02, 0x08, 0x07, 0x12, 0x02, 0x08, 0x08, 0x12, 0x00]
    );
    assert_eq!(context.decode_value("test", &bytes).unwrap(), json!({
        "one": { "data": 7 },
        "many": [{ "data": 8 }, {}]
    }));
}

#[test]
fn test_defaults_are_not_written() {
    let context = single_field("int32");
    assert!(context.encode("test", r#"{"data": 0}"#).unwrap().is_empty());
    assert!(context.encode("test", r#"{"data": null}"#).unwrap().is_empty());

    let context = single_field("optional int32");
    assert_eq!(context.encode("test", r#"{"data": 0}"#).unwrap(), [0x08, 0x00]);
}

#[test]
fn test_oneof_member_keeps_its_zero_value() {
    let context = context_with(
        r#"
        syntax = "proto3";
        message test {
            oneof value {
                string text = 1;
                int32 number = 2;
            }
        }
        "#,
    );
    assert_eq!(context.encode("test", r#"{"number": 0}"#).unwrap(), [0x10, 0x00]);
    assert_eq!(context.encode("test", r#"{"text": "seven"}"#).unwrap(), b64("CgVzZXZlbg=="));

    let err = context
        .encode("test", r#"{"text": "seven", "number": 7}"#)
        .unwrap_err();
    assert_eq!(
        err,
        EncodeError::MultipleOneofMembers {
            message: "test".to_string(),
            oneof: "value".to_string(),
            fields: vec!["text".to_string(), "number".to_string()],
        }
    );
}

#[test]
fn test_json_names_are_accepted() {
    let context = context_with(
        "syntax = \"proto3\";\nmessage test { string user_name = 1; }",
    );
    let by_proto_name = context.encode("test", r#"{"user_name": "ada"}"#).unwrap();
    let by_json_name = context.encode("test", r#"{"userName": "ada"}"#).unwrap();
    assert_eq!(by_proto_name, by_json_name);

    let err = context
        .encode("test", r#"{"user_name": "ada", "userName": "bob"}"#)
        .unwrap_err();
    assert!(matches!(err, EncodeError::DuplicateField { .. }));
}

#[test]
fn test_64_bit_values_accept_strings() {
    let context = single_field("uint64");
    let max = context
        .encode("test", r#"{"data": "18446744073709551615"}"#)
        .unwrap();
    assert_eq!(
        context.decode_value("test", &max).unwrap(),
        json!({ "data": "18446744073709551615" })
    );

    let context = single_field("sint64");
    assert_eq!(context.encode("test", r#"{"data": "-2"}"#).unwrap(), [0x08, 0x03]);
}

#[test]
fn test_unpacked_when_requested() {
    let context = single_field("repeated int32");
    assert_eq!(
        context.encode("test", r#"{"data": [7, 8]}"#).unwrap(),
        [0x0a, 0x02, 0x07, 0x08]
    );

    let context = context_with(
        "syntax = \"proto3\";\nmessage test { repeated int32 data = 1 [packed = false]; }",
    );
    assert_eq!(
        context.encode("test", r#"{"data": [7, 8]}"#).unwrap(),
        [0x08, 0x07, 0x08, 0x08]
    );
}

#[test]
fn test_bytes_accept_url_safe_base64() {
    let context = single_field("bytes");
    let standard = context.encode("test", r#"{"data": "+/8="}"#).unwrap();
    let url_safe = context.encode("test", r#"{"data": "-_8"}"#).unwrap();
    assert_eq!(standard, [0x0a, 0x02, 0xfb, 0xff]);
    assert_eq!(standard, url_safe);
}

#[test]
fn test_non_finite_doubles() {
    let context = single_field("double");
    let bytes = context.encode("test", r#"{"data": "-Infinity"}"#).unwrap();
    assert_eq!(
        context.decode_value("test", &bytes).unwrap(),
        json!({ "data": "-Infinity" })
    );
}

#[test]
fn test_negative_zero_survives_round_trip() {
    for field_type in ["double", "float"] {
        let context = single_field(field_type);
        let bytes = context.encode("test", r#"{"data": -0.0}"#).unwrap();
        assert!(!bytes.is_empty(), "{field_type}");
        let decoded = context.decode_value("test", &bytes).unwrap();
        assert_eq!(decoded["data"].as_f64().map(f64::to_bits), Some((-0.0f64).to_bits()));

        let bytes = context.encode("test", r#"{"data": 0.0}"#).unwrap();
        assert!(bytes.is_empty(), "{field_type}");
    }
}

#[test]
fn test_map_with_integer_keys() {
    let context = single_field("map<int32, string>");
    let bytes = context.encode("test", r#"{"data": {"-1": "minus one"}}"#).unwrap();
    assert_eq!(
        context.decode_value("test", &bytes).unwrap(),
        json!({ "data": { "-1": "minus one" } })
    );

    let err = context.encode("test", r#"{"data": {"one": "x"}}"#).unwrap_err();
    assert!(matches!(err, EncodeError::TypeMismatch { .. }));
}

#[test]
fn test_encode_errors() {
    let context = single_field("int32");

    assert_eq!(
        context.encode("test", r#"{"other": 1}"#).unwrap_err(),
        EncodeError::UnknownField {
            message: "test".to_string(),
            field: "other".to_string(),
        }
    );
    assert!(matches!(
        context.encode("test", r#"{"data": "seven"}"#),
        Err(EncodeError::TypeMismatch { .. })
    ));
    assert!(matches!(
        context.encode("test", r#"{"data": 2147483648}"#),
        Err(EncodeError::OutOfRange { .. })
    ));
    assert!(matches!(
        context.encode("test", r#"{"data": 1.5}"#),
        Err(EncodeError::TypeMismatch { .. })
    ));
    assert!(matches!(
        context.encode("test", "{"),
        Err(EncodeError::InvalidJson(_))
    ));
    assert!(matches!(
        context.encode("test", "[1]"),
        Err(EncodeError::TypeMismatch { .. })
    ));

    let context = context_with(
        "syntax = \"proto3\";\nenum E { A = 0; }\nmessage test { E data = 1; }",
    );
    assert!(matches!(
        context.encode("test", r#"{"data": "Z"}"#),
        Err(EncodeError::UnknownEnumValue { .. })
    ));
}
