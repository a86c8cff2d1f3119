//! Confluent message-index resolution.
//!
//! The first index selects a top-level message of the root unit by
//! declaration order, each further index selects a nested message of the
//! previous one. Map entry messages are not counted. An empty path means
//! `[0]`.

use crate::descriptor::{DescriptorPool, MessageDescriptor, MessageId};
use crate::error::ResolveError;

pub(crate) fn resolve<'a>(
    pool: &'a DescriptorPool,
    root_unit: &str,
    indices: &[i64],
) -> Result<&'a MessageDescriptor, ResolveError> {
    let unit = pool
        .unit_by_name(root_unit)
        .ok_or_else(|| ResolveError::UnknownUnit(root_unit.to_string()))?;
    let indices = if indices.is_empty() { &[0][..] } else { indices };

    let mut candidates: &[MessageId] = unit.messages();
    let mut current = None;
    for (position, &index) in indices.iter().enumerate() {
        let id = usize::try_from(index)
            .ok()
            .and_then(|i| candidates.get(i))
            .ok_or(ResolveError::IndexOutOfRange { position })?;
        let message = pool.message(*id);
        candidates = message.nested_messages();
        current = Some(message);
    }
    current.ok_or(ResolveError::IndexOutOfRange { position: 0 })
}

/// Inverse of [`resolve`]: the index path of a declared message within its
/// unit. `None` for map entries.
pub(crate) fn index_path(pool: &DescriptorPool, message: &MessageDescriptor) -> Option<Vec<i64>> {
    if message.is_map_entry() {
        return None;
    }
    let mut path = Vec::new();
    let mut current = message;
    loop {
        let siblings = match current.parent() {
            Some(parent) => pool.message(parent).nested_messages(),
            None => pool.unit(current.unit()).messages(),
        };
        let position = siblings.iter().position(|&id| id == current.id())?;
        path.push(position as i64);
        match current.parent() {
            Some(parent) => current = pool.message(parent),
            None => break,
        }
    }
    path.reverse();
    Some(path)
}
