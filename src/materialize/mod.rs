//! Result materializer: flat rows → nested object graphs.
//!
//! A joined row is cut into one slice per table at the split plan offsets.
//! Every slice is decoded into a node of an arena; nodes remember which join
//! produced each of their children. Once every row is consumed the arena is
//! folded bottom-up: children always sit at higher indices than their parent,
//! so walking the arena backwards hands each parent fully assembled children,
//! in the order their rows arrived.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::error::{QueryError, QueryResult};
use crate::mapping::{Entity, Key, Row};
use crate::sql::join::{Binding, Cardinality, JoinDescriptor};
use crate::sql::selector::SplitPlan;

/// A decoded object and its identity key.
pub struct Decoded {
    pub object: Box<dyn Any + Send>,
    pub key: Option<Key>,
}

/// Type-erased row decoder for one joined entity type.
pub type Decoder = fn(&Row) -> QueryResult<Decoded>;

pub fn decode_entity<T: Entity>(row: &Row) -> QueryResult<Decoded> {
    let object = T::from_row(row)?;
    let key = object.key();
    Ok(Decoded {
        object: Box::new(object),
        key,
    })
}

/// Map single-table rows onto `T`.
pub fn materialize<T: Entity>(rows: &[Row]) -> QueryResult<Vec<T>> {
    rows.iter().map(T::from_row).collect()
}

struct Node {
    object: Option<Box<dyn Any + Send>>,
    /// (join index, node index), in row order.
    children: Vec<(usize, usize)>,
}

struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn push(&mut self, object: Box<dyn Any + Send>) -> usize {
        self.nodes.push(Node {
            object: Some(object),
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn push_child(&mut self, parent: usize, join: usize, object: Box<dyn Any + Send>) -> usize {
        let index = self.push(object);
        self.nodes[parent].children.push((join, index));
        index
    }

    fn take(&mut self, index: usize) -> QueryResult<Box<dyn Any + Send>> {
        self.nodes[index]
            .object
            .take()
            .ok_or_else(|| QueryError::Materialize(format!("node {index} attached twice")))
    }
}

fn bindings<'j, T: Entity>(
    joins: &'j [JoinDescriptor],
    split: &SplitPlan,
) -> QueryResult<Vec<&'j Binding>> {
    if split.len() != joins.len() {
        return Err(QueryError::Materialize(format!(
            "{} joined tables but {} split points",
            joins.len(),
            split.len()
        )));
    }
    let mut types = vec![TypeId::of::<T>()];
    let mut bindings = Vec::with_capacity(joins.len());
    for join in joins {
        let binding = join.binding.as_ref().ok_or_else(|| {
            QueryError::Materialize(format!(
                "join to `{}` is not bound to a navigation",
                join.entity.type_name
            ))
        })?;
        if types.get(join.parent) != Some(&binding.parent_type) {
            return Err(QueryError::InvalidNavigation {
                entity: join.entity.type_name.to_string(),
                parent: join.parent,
            });
        }
        types.push(binding.child_type);
        bindings.push(binding);
    }
    Ok(bindings)
}

/// Reassemble joined rows into root objects of type `T`.
///
/// One-to-many children are deduplicated per parent by key; children without
/// a key are never merged. One-to-one children are decoded once per parent.
/// A slice whose first column is NULL is an absent object.
pub fn materialize_joined<T: Entity>(
    rows: &[Row],
    joins: &[JoinDescriptor],
    split: &SplitPlan,
) -> QueryResult<Vec<T>> {
    if joins.is_empty() {
        return materialize(rows);
    }
    let bindings = bindings::<T>(joins, split)?;

    let mut arena = Arena { nodes: Vec::new() };
    let mut roots = Vec::new();
    let mut root_by_key: HashMap<Key, usize> = HashMap::new();
    let mut many_by_key: HashMap<(usize, usize, Key), usize> = HashMap::new();
    let mut one_by_parent: HashMap<(usize, usize), usize> = HashMap::new();

    for row in rows {
        let ranges = split.ranges(row.len())?;
        let mut current: Vec<Option<usize>> = vec![None; joins.len() + 1];

        let (start, end) = ranges[0];
        let Decoded { object, key } = decode_entity::<T>(&row.slice(start, end))?;
        let root = match key {
            Some(key) => *root_by_key.entry(key).or_insert_with(|| {
                let index = arena.push(object);
                roots.push(index);
                index
            }),
            None => {
                let index = arena.push(object);
                roots.push(index);
                index
            }
        };
        current[0] = Some(root);

        for (index, join) in joins.iter().enumerate() {
            let position = index + 1;
            let Some(parent) = current[join.parent] else {
                continue;
            };
            let (start, end) = ranges[position];
            let slice = row.slice(start, end);
            let absent = slice.iter().next().map_or(true, |(_, value)| value.is_null());
            if absent {
                continue;
            }

            let node = match join.cardinality {
                Cardinality::OneToOne => match one_by_parent.get(&(parent, index)) {
                    Some(&node) => node,
                    None => {
                        let Decoded { object, .. } = (bindings[index].decode)(&slice)?;
                        let node = arena.push_child(parent, index, object);
                        one_by_parent.insert((parent, index), node);
                        node
                    }
                },
                Cardinality::OneToMany => {
                    let Decoded { object, key } = (bindings[index].decode)(&slice)?;
                    match key {
                        Some(key) => *many_by_key
                            .entry((parent, index, key))
                            .or_insert_with(|| arena.push_child(parent, index, object)),
                        None => arena.push_child(parent, index, object),
                    }
                }
            };
            current[position] = Some(node);
        }
    }

    for index in (0..arena.nodes.len()).rev() {
        let children = std::mem::take(&mut arena.nodes[index].children);
        if children.is_empty() {
            continue;
        }
        let mut parent = arena.take(index)?;
        for (join, child) in children {
            let child = arena.take(child)?;
            (bindings[join].setter)(parent.as_mut(), child)?;
        }
        arena.nodes[index].object = Some(parent);
    }

    let mut out = Vec::with_capacity(roots.len());
    for index in roots {
        let root = arena.take(index)?.downcast::<T>().map_err(|_| {
            QueryError::Materialize(format!("root is not a `{}`", T::descriptor().type_name))
        })?;
        out.push(*root);
    }
    tracing::debug!(rows = rows.len(), roots = out.len(), "materialized joined rows");
    Ok(out)
}
