//! Join planner and alias manager.
//!
//! A join chain is the root table followed by one [`JoinDescriptor`] per
//! joined table; the table at chain index `n` binds expression position `n`.
//! Each descriptor also carries what the materializer needs to put the
//! joined object back into its parent: a row decoder and a cached setter.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use super::expr::Expr;
use super::params::ParameterSet;
use super::predicate::compile_predicate;
use super::scope::Scope;
use super::token::{Token, TokenStream};
use crate::cache::{self, Setter, SetterKey};
use crate::config::ConnectionRegistry;
use crate::error::{QueryError, QueryResult};
use crate::mapping::{Entity, EntityDescriptor};
use crate::materialize::{decode_entity, Decoder};

/// Maximum number of tables in one join chain, root included.
pub const MAX_JOINED_TABLES: usize = 7;

// =============================================================================
// Aliases
// =============================================================================

/// Alias for the type at zero-based `position`.
///
/// The consonant skeleton of the type name (lowercase, vowels and
/// non-alphanumerics removed) suffixed with the 1-based position. Names whose
/// skeleton is shorter than two characters use their first three characters.
pub fn alias_for(type_name: &str, position: usize) -> String {
    let lower = type_name.to_lowercase();
    let skeleton: String = lower
        .chars()
        .filter(|c| c.is_alphanumeric() && !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
        .collect();
    let stem = if skeleton.chars().count() < 2 {
        lower
            .chars()
            .filter(|c| c.is_alphanumeric())
            .take(3)
            .collect()
    } else {
        skeleton
    };
    format!("{stem}{}", position + 1)
}

/// Aliases for every table of a chain, in position order.
pub fn aliases_for(entities: &[&'static EntityDescriptor]) -> Vec<String> {
    entities
        .iter()
        .enumerate()
        .map(|(position, entity)| alias_for(entity.type_name, position))
        .collect()
}

// =============================================================================
// Join descriptors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

/// Typed hooks the materializer uses to rebuild the object graph.
#[derive(Clone)]
pub(crate) struct Binding {
    pub parent_type: TypeId,
    pub child_type: TypeId,
    pub decode: Decoder,
    pub setter: Setter,
}

/// One joined table: how it joins and, when bound to a navigation, where it
/// hangs in the object graph.
#[derive(Clone)]
pub struct JoinDescriptor {
    pub entity: &'static EntityDescriptor,
    /// Position of the ancestor that owns the navigation.
    pub parent: usize,
    pub navigation: Option<&'static str>,
    pub cardinality: Cardinality,
    pub kind: JoinKind,
    pub condition: Option<Expr>,
    pub(crate) binding: Option<Binding>,
}

impl JoinDescriptor {
    /// `parent.navigation: Option<C>`
    pub fn one_to_one<P: Entity, C: Entity>(
        parent: usize,
        navigation: &'static str,
        field: fn(&mut P) -> &mut Option<C>,
    ) -> Self {
        let setter = cache::setter(Self::key::<P, C>(navigation), || {
            let setter: Setter = Arc::new(
                move |parent: &mut (dyn Any + Send), child: Box<dyn Any + Send>| {
                    let (parent, child) = downcast_pair::<P, C>(parent, child, navigation)?;
                    *field(parent) = Some(child);
                    Ok(())
                },
            );
            setter
        });
        Self::bound::<P, C>(parent, navigation, Cardinality::OneToOne, setter)
    }

    /// `parent.navigation: Vec<C>`
    pub fn one_to_many<P: Entity, C: Entity>(
        parent: usize,
        navigation: &'static str,
        field: fn(&mut P) -> &mut Vec<C>,
    ) -> Self {
        let setter = cache::setter(Self::key::<P, C>(navigation), || {
            let setter: Setter = Arc::new(
                move |parent: &mut (dyn Any + Send), child: Box<dyn Any + Send>| {
                    let (parent, child) = downcast_pair::<P, C>(parent, child, navigation)?;
                    field(parent).push(child);
                    Ok(())
                },
            );
            setter
        });
        Self::bound::<P, C>(parent, navigation, Cardinality::OneToMany, setter)
    }

    /// A join that only filters or feeds a grouping; it cannot be materialized.
    pub fn unbound(entity: &'static EntityDescriptor, parent: usize) -> Self {
        Self {
            entity,
            parent,
            navigation: None,
            cardinality: Cardinality::OneToOne,
            kind: JoinKind::Inner,
            condition: None,
            binding: None,
        }
    }

    fn key<P: 'static, C: 'static>(navigation: &'static str) -> SetterKey {
        SetterKey {
            parent: TypeId::of::<P>(),
            child: TypeId::of::<C>(),
            navigation,
        }
    }

    fn bound<P: Entity, C: Entity>(
        parent: usize,
        navigation: &'static str,
        cardinality: Cardinality,
        setter: Setter,
    ) -> Self {
        Self {
            entity: C::descriptor(),
            parent,
            navigation: Some(navigation),
            cardinality,
            kind: JoinKind::Inner,
            condition: None,
            binding: Some(Binding {
                parent_type: TypeId::of::<P>(),
                child_type: TypeId::of::<C>(),
                decode: decode_entity::<C>,
                setter,
            }),
        }
    }

    /// Join condition over positions up to and including this join.
    pub fn on(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn left(mut self) -> Self {
        self.kind = JoinKind::Left;
        self
    }
}

impl fmt::Debug for JoinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinDescriptor")
            .field("entity", &self.entity.type_name)
            .field("parent", &self.parent)
            .field("navigation", &self.navigation)
            .field("cardinality", &self.cardinality)
            .field("kind", &self.kind)
            .field("condition", &self.condition)
            .finish()
    }
}

fn downcast_pair<'p, P: 'static, C: 'static>(
    parent: &'p mut (dyn Any + Send),
    child: Box<dyn Any + Send>,
    navigation: &str,
) -> QueryResult<(&'p mut P, C)> {
    let parent = parent.downcast_mut::<P>().ok_or_else(|| {
        QueryError::Materialize(format!("`{navigation}` is bound to a different parent type"))
    })?;
    let child = child.downcast::<C>().map_err(|_| {
        QueryError::Materialize(format!("`{navigation}` received a different child type"))
    })?;
    Ok((parent, *child))
}

// =============================================================================
// JOIN emission
// =============================================================================

/// Reject chains outside 2..=7 tables and navigations to later positions.
pub fn validate_chain(joins: &[JoinDescriptor]) -> QueryResult<()> {
    let tables = joins.len() + 1;
    if !joins.is_empty() && tables > MAX_JOINED_TABLES {
        return Err(QueryError::JoinFanOut(tables));
    }
    for (index, join) in joins.iter().enumerate() {
        let position = index + 1;
        if join.parent >= position {
            return Err(QueryError::InvalidNavigation {
                entity: join.entity.type_name.to_string(),
                parent: join.parent,
            });
        }
        if join.condition.is_none() {
            return Err(QueryError::MissingJoinCondition(
                join.entity.type_name.to_string(),
            ));
        }
    }
    Ok(())
}

/// `[table]`, or `[schema].[table]` when the entity declares a schema.
pub fn table_token(entity: &EntityDescriptor) -> Token {
    Token::QualifiedIdent {
        database: None,
        schema: entity.schema.map(str::to_string),
        name: entity.table_name().to_string(),
    }
}

/// Table reference for a joined entity, qualified with its catalog when it
/// lives in another database on the root's server.
fn joined_table_token(
    root: &EntityDescriptor,
    joined: &EntityDescriptor,
    registry: Option<&ConnectionRegistry>,
) -> QueryResult<Token> {
    let Some(registry) = registry.filter(|r| !r.is_empty()) else {
        return Ok(table_token(joined));
    };
    let base = registry.resolve(root)?;
    let target = registry.resolve(joined)?;
    if !base.same_server(target) {
        return Err(QueryError::DifferentServer {
            base: root.type_name.to_string(),
            joined: joined.type_name.to_string(),
        });
    }
    if base.same_database(target) {
        return Ok(table_token(joined));
    }
    // An unqualified name would resolve inside the root's database.
    let Some(database) = target.database.clone() else {
        return Err(QueryError::UnknownDatabase {
            base: root.type_name.to_string(),
            joined: joined.type_name.to_string(),
        });
    };
    Ok(Token::QualifiedIdent {
        database: Some(database),
        schema: joined
            .schema
            .map(str::to_string)
            .or_else(|| target.default_schema.clone()),
        name: joined.table_name().to_string(),
    })
}

/// Emit ` INNER|LEFT JOIN <table> <alias> [WITH (NOLOCK)] ON <condition>` for
/// every join, each condition restricted to the positions declared so far.
pub fn join_clauses(
    root: &EntityDescriptor,
    joins: &[JoinDescriptor],
    scope: &Scope,
    registry: Option<&ConnectionRegistry>,
    dirty_read: bool,
    params: &mut ParameterSet,
) -> QueryResult<TokenStream> {
    validate_chain(joins)?;
    let mut ts = TokenStream::new();
    for (index, join) in joins.iter().enumerate() {
        let position = index + 1;
        let table = joined_table_token(root, join.entity, registry)?;
        let condition = join
            .condition
            .as_ref()
            .ok_or_else(|| QueryError::MissingJoinCondition(join.entity.type_name.to_string()))?;
        let compiled = compile_predicate(condition, &scope.restrict(position + 1), params)?;

        ts.space()
            .keyword(match join.kind {
                JoinKind::Inner => Token::Inner,
                JoinKind::Left => Token::Left,
            })
            .keyword(Token::Join)
            .push(table);
        if let Some(alias) = scope.alias(position) {
            ts.space().push(Token::Alias(alias.to_string()));
        }
        if dirty_read {
            ts.space().push(Token::NoLock);
        }
        ts.space().keyword(Token::On).append(&compiled.sql);
    }
    Ok(ts)
}
