//! Local `.proto` files given on the command line.

use std::path::PathBuf;

use anyhow::Context;
use protoscribe_engine::SchemaContext;

/// One `--proto` argument: `NAME=PATH`, or just `PATH` to use the path as
/// the unit name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoFileSpec {
    pub name: String,
    pub path: PathBuf,
}

impl std::str::FromStr for ProtoFileSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = match s.split_once('=') {
            Some((name, path)) => (name.trim(), path.trim()),
            None => (s.trim(), s.trim()),
        };
        if name.is_empty() || path.is_empty() {
            return Err(format!("expected NAME=PATH, got '{s}'"));
        }
        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(path),
        })
    }
}

/// Compiles the files in the order given; imports must come first.
pub fn load_context(specs: &[ProtoFileSpec]) -> anyhow::Result<SchemaContext> {
    let mut context = SchemaContext::new();
    for spec in specs {
        let text = std::fs::read_to_string(&spec.path)
            .with_context(|| format!("Failed to read schema file {:?}", spec.path))?;
        context
            .add_unit(&spec.name, &text)
            .with_context(|| format!("Failed to compile schema file {:?}", spec.path))?;
        tracing::debug!("Loaded schema unit {} from {:?}", spec.name, spec.path);
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_spec() {
        let spec: ProtoFileSpec = "diet.proto=schemas/diet.proto".parse().unwrap();
        assert_eq!(spec.name, "diet.proto");
        assert_eq!(spec.path, PathBuf::from("schemas/diet.proto"));

        let spec: ProtoFileSpec = "animal.proto".parse().unwrap();
        assert_eq!(spec.name, "animal.proto");

        assert!("=x".parse::<ProtoFileSpec>().is_err());
    }

    #[test]
    fn test_load_context_in_order() {
        let mut diet = tempfile::NamedTempFile::new().unwrap();
        writeln!(diet, "syntax = \"proto3\"; enum Diet {{ carnivorous = 0; }}").unwrap();
        let mut animal = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            animal,
            "syntax = \"proto3\"; import \"diet.proto\"; message Animal {{ Diet diet = 1; }}"
        )
        .unwrap();

        let specs = vec![
            ProtoFileSpec {
                name: "diet.proto".to_string(),
                path: diet.path().to_path_buf(),
            },
            ProtoFileSpec {
                name: "animal.proto".to_string(),
                path: animal.path().to_path_buf(),
            },
        ];
        let context = load_context(&specs).unwrap();
        assert!(context.message("Animal").is_some());

        let reversed: Vec<ProtoFileSpec> = specs.into_iter().rev().collect();
        let err = load_context(&reversed).unwrap_err();
        assert!(format!("{err:#}").contains("diet.proto"), "{err:#}");
    }
}
