//! End-to-end decoding of a record stream against an in-memory registry.

use protoscribe::framing::encode_frame;
use protoscribe::reader::{read_records, ReaderError, ReaderOptions};
use protoscribe_engine::DecodeOptions;
use protoscribe_registry::{RegisteredSchema, SchemaCache, StaticSource};

const INDEXED: &str = r#"
    syntax = "proto3";

    message main_0 {
        string data = 1;

        message nested_0 {
            string data = 1;
        }

        message nested_1 {
            int32 user_id = 1;
        }
    }
"#;

fn source() -> StaticSource {
    StaticSource::new()
        .with_id(
            1,
            RegisteredSchema::protobuf(
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
            .with_reference("diet.proto", "diet-value", 1),
        )
        .with_version(
            "diet-value",
            1,
            RegisteredSchema::protobuf(
                "syntax = \"proto3\";\nenum Diet { carnivorous = 0; herbivorous = 1; }",
            ),
        )
        .with_id(2, RegisteredSchema::protobuf(INDEXED))
}

fn record(offset: &str, key: &str, value: &[u8]) -> Vec<u8> {
    let mut out = format!("{offset}\n{key}\n").into_bytes();
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
    out
}

const IGUANODON: &[u8] = &[
    0x0a, 0x09, b'I', b'g', b'u', b'a', b'n', b'o', b'd', b'o', b'n', 0x10, 0x01, 0x19, 0, 0, 0,
    0, 0, 0, 0x24, 0x40,
];

async fn run(input: &[u8], options: &ReaderOptions) -> (Result<u64, ReaderError>, String) {
    let mut cache = SchemaCache::new(source());
    let mut output = Vec::new();
    let result = read_records(input, &mut output, &mut cache, options)
        .await
        .map(|stats| stats.records);
    (result, String::from_utf8(output).unwrap())
}

#[tokio::test]
async fn test_reads_records_with_references_and_indexes() {
    let mut input = record("0", "dino", &encode_frame(1, &[0], IGUANODON));
    input.extend(record("1", "m", &encode_frame(2, &[0, 1], &[0x08, 0x07])));
    input.extend(record("2", "n", &encode_frame(2, &[0], &[0x0a, 0x01, b'x'])));

    let (result, output) = run(&input, &ReaderOptions::default()).await;
    assert_eq!(result.unwrap(), 3);

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(
        lines,
        [
            r#"{"@offset":0,"@key":"dino","name":"Iguanodon","diet":"herbivorous","length":10.0}"#,
            r#"{"@offset":1,"@key":"m","user_id":7}"#,
            r#"{"@offset":2,"@key":"n","data":"x"}"#,
        ]
    );
}

#[tokio::test]
async fn test_json_names_option() {
    let input = record("5", "k", &encode_frame(2, &[0, 1], &[0x08, 0x07]));
    let options = ReaderOptions {
        decode: DecodeOptions {
            emit_defaults: false,
            use_json_names: true,
        },
        skip_invalid: false,
    };
    let (result, output) = run(&input, &options).await;
    assert_eq!(result.unwrap(), 1);
    assert_eq!(output.trim_end(), r#"{"@offset":5,"@key":"k","userId":7}"#);
}

#[tokio::test]
async fn test_bad_index_stops_the_stream() {
    let mut input = record("0", "a", &encode_frame(2, &[0, 2], &[]));
    input.extend(record("1", "b", &encode_frame(2, &[0], &[])));

    let (result, output) = run(&input, &ReaderOptions::default()).await;
    let err = result.unwrap_err();
    assert!(matches!(err, ReaderError::Resolve { .. }), "{err:?}");
    assert_eq!(
        err.to_string(),
        "record at offset 0: Index out of range at position 1"
    );
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_skip_invalid_continues() {
    let mut input = record("0", "a", &encode_frame(2, &[0, 2], &[]));
    input.extend(record("1", "b", &encode_frame(2, &[0], b"invalid data")));
    input.extend(record("2", "c", &encode_frame(2, &[0], &[])));

    let options = ReaderOptions {
        skip_invalid: true,
        ..ReaderOptions::default()
    };
    let mut cache = SchemaCache::new(source());
    let mut output = Vec::new();
    let stats = read_records(input.as_slice(), &mut output, &mut cache, &options)
        .await
        .unwrap();
    assert_eq!(stats.records, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "{\"@offset\":2,\"@key\":\"c\"}\n"
    );
}

#[tokio::test]
async fn test_bad_magic_is_fatal_even_when_skipping() {
    let mut framed = encode_frame(2, &[0], &[]);
    framed[0] = 1;
    let input = record("0", "a", &framed);

    let options = ReaderOptions {
        skip_invalid: true,
        ..ReaderOptions::default()
    };
    let (result, _) = run(&input, &options).await;
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Incorrect magic byte (1)");
}

#[tokio::test]
async fn test_unknown_schema_id_is_fatal() {
    let input = record("0", "a", &encode_frame(99, &[0], &[]));
    let (result, _) = run(&input, &ReaderOptions::default()).await;
    assert!(matches!(result, Err(ReaderError::Registry { .. })));
}

#[tokio::test]
async fn test_truncated_stream_is_fatal() {
    let mut input = record("0", "dino", &encode_frame(1, &[0], IGUANODON));
    input.truncate(input.len() - 3);
    let (result, _) = run(&input, &ReaderOptions::default()).await;
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Unexpected EOF while reading record value");
}
