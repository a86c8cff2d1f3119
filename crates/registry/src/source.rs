//! Where schemas come from.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{RegistryError, Result};

/// A named import of another registered schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaReference {
    /// Import path the referring schema uses, e.g. `common/header.proto`.
    pub name: String,
    pub subject: String,
    pub version: i32,
}

/// Schema text plus the references it imports, as the registry returns it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredSchema {
    pub schema: String,
    /// Absent means AVRO in the registry API.
    #[serde(default)]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub references: Vec<SchemaReference>,
}

impl RegisteredSchema {
    pub fn protobuf(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            schema_type: Some("PROTOBUF".to_string()),
            references: Vec::new(),
        }
    }

    pub fn with_reference(mut self, name: &str, subject: &str, version: i32) -> Self {
        self.references.push(SchemaReference {
            name: name.to_string(),
            subject: subject.to_string(),
            version,
        });
        self
    }

    pub fn schema_type(&self) -> &str {
        self.schema_type.as_deref().unwrap_or("AVRO")
    }

    /// Rejects anything but protobuf schemas.
    pub(crate) fn ensure_protobuf(&self, schema: impl std::fmt::Display) -> Result<()> {
        if self.schema_type() == "PROTOBUF" {
            Ok(())
        } else {
            Err(RegistryError::UnsupportedSchemaType {
                schema: schema.to_string(),
                schema_type: self.schema_type().to_string(),
            })
        }
    }
}

/// Lookup of registered schemas by global id or by subject version.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn schema_by_id(&self, id: u32) -> Result<RegisteredSchema>;

    async fn schema_by_version(&self, subject: &str, version: i32) -> Result<RegisteredSchema>;
}

#[async_trait]
impl<S: SchemaSource + ?Sized> SchemaSource for std::sync::Arc<S> {
    async fn schema_by_id(&self, id: u32) -> Result<RegisteredSchema> {
        (**self).schema_by_id(id).await
    }

    async fn schema_by_version(&self, subject: &str, version: i32) -> Result<RegisteredSchema> {
        (**self).schema_by_version(subject, version).await
    }
}

/// Fixed set of schemas held in memory, for offline use and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    by_id: HashMap<u32, RegisteredSchema>,
    by_version: HashMap<(String, i32), RegisteredSchema>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: u32, schema: RegisteredSchema) -> Self {
        self.by_id.insert(id, schema);
        self
    }

    pub fn with_version(mut self, subject: &str, version: i32, schema: RegisteredSchema) -> Self {
        self.by_version.insert((subject.to_string(), version), schema);
        self
    }
}

#[async_trait]
impl SchemaSource for StaticSource {
    async fn schema_by_id(&self, id: u32) -> Result<RegisteredSchema> {
        self.by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("id {id}")))
    }

    async fn schema_by_version(&self, subject: &str, version: i32) -> Result<RegisteredSchema> {
        self.by_version
            .get(&(subject.to_string(), version))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("{subject} version {version}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_by_id_response() {
        let body = r#"{
            "schema": "syntax = \"proto3\";",
            "schemaType": "PROTOBUF",
            "references": [{"name": "diet.proto", "subject": "diet-value", "version": 1}]
        }"#;
        let schema: RegisteredSchema = serde_json::from_str(body).unwrap();
        assert_eq!(schema.schema_type(), "PROTOBUF");
        assert_eq!(
            schema.references,
            vec![SchemaReference {
                name: "diet.proto".to_string(),
                subject: "diet-value".to_string(),
                version: 1,
            }]
        );
    }

    #[test]
    fn test_deserialize_version_response_without_references() {
        let body = r#"{
            "subject": "diet-value",
            "version": 1,
            "id": 7,
            "schemaType": "PROTOBUF",
            "schema": "syntax = \"proto3\";"
        }"#;
        let schema: RegisteredSchema = serde_json::from_str(body).unwrap();
        assert!(schema.references.is_empty());
        assert!(schema.ensure_protobuf("diet-value").is_ok());
    }

    #[test]
    fn test_missing_schema_type_is_avro() {
        let schema: RegisteredSchema =
            serde_json::from_str(r#"{"schema": "{\"type\": \"string\"}"}"#).unwrap();
        assert_eq!(schema.schema_type(), "AVRO");
        assert!(matches!(
            schema.ensure_protobuf("id 3"),
            Err(RegistryError::UnsupportedSchemaType { .. })
        ));
    }
}
