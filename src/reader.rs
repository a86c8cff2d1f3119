//! Decodes a record stream into JSON lines.

use std::io::{BufRead, Write};

use protoscribe_engine::{DecodeError, DecodeOptions, ResolveError};
use protoscribe_registry::{RegistryError, SchemaCache, SchemaSource, ROOT_UNIT};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::framing::{decode_frame, FramingError};
use crate::record::{Record, RecordReader};

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("record at offset {offset}: {source}")]
    Registry {
        offset: String,
        #[source]
        source: RegistryError,
    },

    #[error("record at offset {offset}: {source}")]
    Resolve {
        offset: String,
        #[source]
        source: ResolveError,
    },

    #[error("record at offset {offset}: {source}")]
    Decode {
        offset: String,
        #[source]
        source: DecodeError,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    pub decode: DecodeOptions,
    /// Log and skip records whose message index or payload is invalid.
    /// Framing and registry failures still abort.
    pub skip_invalid: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub records: u64,
    pub skipped: u64,
}

/// Reads every record from `input`, writing one JSON object per line to
/// `output`.
pub async fn read_records<R, W, S>(
    input: R,
    output: &mut W,
    cache: &mut SchemaCache<S>,
    options: &ReaderOptions,
) -> Result<ReaderStats, ReaderError>
where
    R: BufRead,
    W: Write,
    S: SchemaSource,
{
    let mut stats = ReaderStats::default();

    for record in RecordReader::new(input) {
        let record = record?;
        match decode_record(&record, cache, options).await {
            Ok(line) => {
                writeln!(output, "{line}")?;
                stats.records += 1;
            }
            Err(e @ (ReaderError::Resolve { .. } | ReaderError::Decode { .. }))
                if options.skip_invalid =>
            {
                tracing::warn!("Skipping record: {e}");
                stats.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    output.flush()?;
    tracing::info!(
        records = stats.records,
        skipped = stats.skipped,
        "Finished reading records"
    );
    Ok(stats)
}

async fn decode_record<S: SchemaSource>(
    record: &Record,
    cache: &mut SchemaCache<S>,
    options: &ReaderOptions,
) -> Result<Value, ReaderError> {
    let frame = decode_frame(&record.value)?;
    let context = cache
        .get(frame.schema_id)
        .await
        .map_err(|source| ReaderError::Registry {
            offset: record.offset.clone(),
            source,
        })?;

    let message_type = context
        .resolve_name(ROOT_UNIT, &frame.message_index)
        .map_err(|source| ReaderError::Resolve {
            offset: record.offset.clone(),
            source,
        })?;
    tracing::trace!(
        schema_id = frame.schema_id,
        message_type = %message_type,
        "decoding record"
    );

    let decoded = context
        .decode_with(&message_type, frame.payload, &options.decode)
        .map_err(|source| ReaderError::Decode {
            offset: record.offset.clone(),
            source,
        })?;
    Ok(with_record_fields(record, decoded))
}

/// Prefixes the decoded message with `@offset` and `@key`. Numeric offsets
/// stay numbers.
pub fn with_record_fields(record: &Record, decoded: Value) -> Value {
    let mut object = Map::new();
    let offset = match record.offset.trim().parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(record.offset.clone()),
    };
    object.insert("@offset".to_string(), offset);
    object.insert("@key".to_string(), Value::String(record.key.clone()));
    if let Value::Object(fields) = decoded {
        object.extend(fields);
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_fields_come_first() {
        let record = Record {
            offset: "42".to_string(),
            key: "user-\"1\"".to_string(),
            value: Vec::new(),
        };
        let line = with_record_fields(&record, json!({ "name": "ada" })).to_string();
        assert_eq!(line, r#"{"@offset":42,"@key":"user-\"1\"","name":"ada"}"#);
    }

    #[test]
    fn test_non_numeric_offset_is_a_string() {
        let record = Record {
            offset: "p0:17".to_string(),
            key: String::new(),
            value: Vec::new(),
        };
        assert_eq!(
            with_record_fields(&record, json!({})),
            json!({ "@offset": "p0:17", "@key": "" })
        );
    }
}
