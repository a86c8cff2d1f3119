//! Compiled schemas keyed by registry schema id.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use protoscribe_engine::SchemaContext;

use crate::error::{RegistryError, Result};
use crate::source::{SchemaReference, SchemaSource};

/// Unit name the root schema of every cached context is registered under.
/// Message-index paths are resolved against it.
pub const ROOT_UNIT: &str = "<root>";

/// A schema whose references are still being registered.
struct Frame {
    name: String,
    schema: String,
    references: Vec<SchemaReference>,
    next: usize,
}

/// Owns one [`SchemaContext`] per schema id, fetching and compiling on first
/// use.
pub struct SchemaCache<S> {
    source: S,
    entries: HashMap<u32, Arc<SchemaContext>>,
    /// Insertion order, oldest first.
    order: VecDeque<u32>,
    max_entries: Option<usize>,
}

impl<S: SchemaSource> SchemaCache<S> {
    /// Cache without a size bound.
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries: None,
        }
    }

    /// Cache holding at most `max_entries` contexts; the oldest inserted one
    /// is evicted first.
    pub fn with_capacity_limit(source: S, max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::new(source)
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, schema_id: u32) -> bool {
        self.entries.contains_key(&schema_id)
    }

    /// Returns the context for `schema_id`, building it on a miss. Failed
    /// builds are not cached.
    pub async fn get(&mut self, schema_id: u32) -> Result<Arc<SchemaContext>> {
        if let Some(context) = self.entries.get(&schema_id) {
            tracing::trace!(schema_id, "schema cache hit");
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(self.build(schema_id).await?);
        self.insert(schema_id, Arc::clone(&context));
        Ok(context)
    }

    fn insert(&mut self, schema_id: u32, context: Arc<SchemaContext>) {
        if let Some(max) = self.max_entries {
            while self.entries.len() >= max {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                tracing::debug!(schema_id = oldest, "evicted schema from cache");
            }
        }
        self.entries.insert(schema_id, context);
        self.order.push_back(schema_id);
    }

    /// Fetches the root schema and everything it references, registering
    /// each unit after all of its own references.
    async fn build(&self, schema_id: u32) -> Result<SchemaContext> {
        let root = self.source.schema_by_id(schema_id).await?;
        root.ensure_protobuf(format_args!("id {schema_id}"))?;

        let mut context = SchemaContext::new();
        let mut stack = vec![Frame {
            name: ROOT_UNIT.to_string(),
            schema: root.schema,
            references: root.references,
            next: 0,
        }];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let next = frame.references.get(frame.next).cloned();
            frame.next += 1;

            match next {
                Some(reference) => {
                    if context.has_unit(&reference.name) {
                        continue;
                    }
                    if stack.iter().any(|f| f.name == reference.name) {
                        return Err(RegistryError::ReferenceCycle(reference.name));
                    }
                    let fetched = self
                        .source
                        .schema_by_version(&reference.subject, reference.version)
                        .await?;
                    fetched.ensure_protobuf(format_args!(
                        "{} version {}",
                        reference.subject, reference.version
                    ))?;
                    stack.push(Frame {
                        name: reference.name,
                        schema: fetched.schema,
                        references: fetched.references,
                        next: 0,
                    });
                }
                None => {
                    if let Some(done) = stack.pop() {
                        context
                            .add_unit(&done.name, &done.schema)
                            .map_err(|source| RegistryError::Compile {
                                unit: done.name.clone(),
                                source,
                            })?;
                    }
                }
            }
        }

        tracing::debug!(
            schema_id,
            units = context.units().count(),
            "compiled schema"
        );
        Ok(context)
    }
}
