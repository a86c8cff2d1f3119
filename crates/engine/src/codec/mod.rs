//! Descriptor-driven conversion between protobuf binary and JSON values.

pub mod decoder;
pub mod encoder;
pub mod wire;

pub use decoder::{DecodeOptions, ProtoDecoder, MAX_RECURSION_DEPTH};
pub use encoder::ProtoEncoder;
