//! protoscribe library
//!
//! Turns schema-registry framed protobuf records into JSON lines, compiling
//! the schemas they reference at runtime.
//!
//! # Crates
//!
//! - `protoscribe_engine` - IDL compiler, message-index resolver and the
//!   protobuf <-> JSON codec
//! - `protoscribe_registry` - schema-registry client and schema-id cache
//!
//! # CLI Usage
//!
//! ```bash
//! # Decode a dump of records using a schema registry
//! protoscribe read records.bin --schema-registry http://localhost:8081
//!
//! # Decode one payload against local schema files
//! protoscribe decode --proto diet.proto=./diet.proto --proto animal.proto=./animal.proto \
//!   --message-type Animal CglJZ3Vhbm9kb24QARkAAAAAAAAkQA==
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use protoscribe_engine::DecodeOptions;
use protoscribe_registry::RegistryConfig;

pub mod config;
pub mod framing;
pub mod reader;
pub mod record;
pub mod schema_files;

pub use protoscribe_engine as engine;
pub use protoscribe_registry as registry;

#[derive(Parser, Clone, Debug)]
pub struct RegistryOpts {
    /// Schema registry URL
    #[arg(long = "schema-registry", env = "SCHEMA_REGISTRY_URL")]
    pub schema_registry: String,

    /// Schema registry username (basic auth)
    #[arg(long, env = "SCHEMA_REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    /// Schema registry password (basic auth)
    #[arg(long, env = "SCHEMA_REGISTRY_PASSWORD", hide_env_values = true)]
    pub registry_password: Option<String>,

    /// Request timeout, e.g. "30s" or "2m"
    #[arg(long, default_value = "30s")]
    pub registry_timeout: String,

    /// Accept invalid TLS certificates from the registry
    #[arg(long)]
    pub insecure: bool,

    /// Maximum number of compiled schemas kept in memory (unbounded if unset)
    #[arg(long)]
    pub cache_capacity: Option<usize>,
}

impl RegistryOpts {
    pub fn to_config(&self) -> anyhow::Result<RegistryConfig> {
        let timeout = config::parse_duration_to_secs(&self.registry_timeout)
            .with_context(|| format!("Invalid --registry-timeout: {}", self.registry_timeout))?;
        Ok(RegistryConfig {
            url: self.schema_registry.clone(),
            username: self.registry_username.clone(),
            password: self.registry_password.clone(),
            timeout: Duration::from_secs(timeout),
            accept_invalid_certs: self.insecure,
        })
    }
}

#[derive(Parser, Clone, Debug, Default)]
pub struct OutputOpts {
    /// Print fields that hold their default value
    #[arg(long)]
    pub emit_defaults: bool,

    /// Key output objects by JSON (lowerCamelCase) field names
    #[arg(long)]
    pub json_names: bool,
}

impl OutputOpts {
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            emit_defaults: self.emit_defaults,
            use_json_names: self.json_names,
        }
    }
}
