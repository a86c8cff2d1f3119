//! Command-line interface for protoscribe
//!
//! # Usage Examples
//!
//! ## Read a record dump
//! ```bash
//! # Each record: offset line, key line, 4-byte big-endian length, value
//! protoscribe read records.bin --schema-registry http://localhost:8081
//!
//! # From stdin, skipping records that fail to decode
//! cat records.bin | protoscribe read - \
//!   --schema-registry https://registry.internal:8081 \
//!   --registry-username reader --registry-password secret \
//!   --skip-invalid
//! ```
//!
//! ## Work with local schema files
//! ```bash
//! # Decode one base64 payload
//! protoscribe decode --proto diet.proto=./diet.proto --proto animal.proto=./animal.proto \
//!   --message-type Animal CglJZ3Vhbm9kb24QARkAAAAAAAAkQA==
//!
//! # Encode a JSON document into a framed payload for schema id 7
//! protoscribe encode --proto animal.proto=./animal.proto --message-type Animal \
//!   --frame-schema-id 7 '{"name": "Iguanodon"}'
//! ```

use std::io::{BufReader, Read};

use anyhow::Context;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use protoscribe::framing::{decode_frame, encode_frame};
use protoscribe::reader::{read_records, ReaderOptions};
use protoscribe::schema_files::{load_context, ProtoFileSpec};
use protoscribe::{OutputOpts, RegistryOpts};
use protoscribe_engine::SchemaContext;
use protoscribe_registry::{RegistryClient, SchemaCache};

#[derive(Parser)]
#[command(name = "protoscribe")]
#[command(about = "Decode schema-registry framed protobuf records into JSON")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a record stream, resolving schemas through a schema registry
    Read {
        /// Record stream file, or "-" for stdin
        #[arg(default_value = "-")]
        input: String,

        #[command(flatten)]
        registry: RegistryOpts,

        #[command(flatten)]
        output: OutputOpts,

        /// Log and skip records that fail to decode instead of stopping
        #[arg(long)]
        skip_invalid: bool,
    },

    /// Decode a single payload against local schema files
    Decode {
        /// Schema file as NAME=PATH, in dependency order (repeatable)
        #[arg(long = "proto", value_name = "NAME=PATH", required = true)]
        protos: Vec<ProtoFileSpec>,

        /// Fully qualified message type; otherwise resolved from --root/--index
        #[arg(long)]
        message_type: Option<String>,

        /// Unit the message index is resolved against (default: last --proto)
        #[arg(long)]
        root: Option<String>,

        /// Message index path, e.g. "0,1"
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        index: Vec<i64>,

        /// Payload is schema-registry framed; take the index from the frame
        #[arg(long)]
        framed: bool,

        /// Payload is hex instead of base64
        #[arg(long)]
        hex: bool,

        #[command(flatten)]
        output: OutputOpts,

        /// Payload to decode
        payload: String,
    },

    /// Encode a JSON document against local schema files, printing base64
    Encode {
        /// Schema file as NAME=PATH, in dependency order (repeatable)
        #[arg(long = "proto", value_name = "NAME=PATH", required = true)]
        protos: Vec<ProtoFileSpec>,

        /// Fully qualified message type
        #[arg(long)]
        message_type: String,

        /// Wrap the payload in a schema-registry frame with this schema id
        #[arg(long)]
        frame_schema_id: Option<u32>,

        /// Message index for the frame (default: the type's own index)
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        index: Vec<i64>,

        /// JSON document, or "-" for stdin
        json: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays one JSON document per line
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Read {
            input,
            registry,
            output,
            skip_invalid,
        } => run_read(input, registry, output, skip_invalid).await?,
        Commands::Decode {
            protos,
            message_type,
            root,
            index,
            framed,
            hex,
            output,
            payload,
        } => {
            let context = load_context(&protos)?;
            let bytes = parse_payload(&payload, hex)?;
            let (index, payload) = if framed {
                let frame = decode_frame(&bytes).context("Failed to parse frame")?;
                let index = if index.is_empty() { frame.message_index } else { index };
                (index, frame.payload.to_vec())
            } else {
                (index, bytes)
            };

            let message_type = match message_type {
                Some(message_type) => message_type,
                None => {
                    let root = match root {
                        Some(root) => root,
                        None => default_root(&context)?,
                    };
                    context
                        .resolve_name(&root, &index)
                        .with_context(|| format!("Failed to resolve message index {index:?}"))?
                }
            };

            let value = context
                .decode_with(&message_type, &payload, &output.decode_options())
                .with_context(|| format!("Failed to decode {message_type}"))?;
            println!("{value}");
        }
        Commands::Encode {
            protos,
            message_type,
            frame_schema_id,
            index,
            json,
        } => {
            let context = load_context(&protos)?;
            let json = if json == "-" {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .context("Failed to read JSON from stdin")?;
                text
            } else {
                json
            };

            let payload = context
                .encode(&message_type, &json)
                .with_context(|| format!("Failed to encode {message_type}"))?;
            let bytes = match frame_schema_id {
                Some(schema_id) => {
                    let index = if index.is_empty() {
                        context.message_index(&message_type).with_context(|| {
                            format!("{message_type} has no message index")
                        })?
                    } else {
                        index
                    };
                    encode_frame(schema_id, &index, &payload)
                }
                None => payload,
            };
            println!("{}", base64::engine::general_purpose::STANDARD.encode(bytes));
        }
    }

    Ok(())
}

async fn run_read(
    input: String,
    registry: RegistryOpts,
    output: OutputOpts,
    skip_invalid: bool,
) -> anyhow::Result<()> {
    let client = RegistryClient::new(registry.to_config()?)
        .context("Failed to create schema registry client")?;
    let mut cache = match registry.cache_capacity {
        Some(max) => SchemaCache::with_capacity_limit(client, max),
        None => SchemaCache::new(client),
    };
    let options = ReaderOptions {
        decode: output.decode_options(),
        skip_invalid,
    };

    tracing::info!(
        "Reading records from {input} using schema registry {}",
        registry.schema_registry
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let stats = if input == "-" {
        read_records(std::io::stdin().lock(), &mut out, &mut cache, &options).await?
    } else {
        let file = std::fs::File::open(&input)
            .with_context(|| format!("Failed to open record file: {input}"))?;
        read_records(BufReader::new(file), &mut out, &mut cache, &options).await?
    };

    tracing::info!(
        "Decoded {} records ({} skipped)",
        stats.records,
        stats.skipped
    );
    Ok(())
}

fn parse_payload(payload: &str, is_hex: bool) -> anyhow::Result<Vec<u8>> {
    let payload = payload.trim();
    if is_hex {
        hex::decode(payload).context("Payload is not valid hex")
    } else {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .context("Payload is not valid base64")
    }
}

/// The last unit given is the one the others were loaded for.
fn default_root(context: &SchemaContext) -> anyhow::Result<String> {
    context
        .units()
        .last()
        .map(|unit| unit.name().to_string())
        .context("No schema files loaded")
}
