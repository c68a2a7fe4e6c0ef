//! Positional scope of a statement: which entity sits at each parameter
//! position and, optionally, which alias qualifies its columns.

use super::expr::MemberRef;
use super::token::{Token, TokenStream};
use crate::error::{QueryError, QueryResult};
use crate::mapping::{EntityDescriptor, MemberDescriptor};

/// A member resolved against the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMember {
    pub position: usize,
    pub entity: &'static EntityDescriptor,
    pub member: &'static MemberDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    types: Vec<&'static EntityDescriptor>,
    aliases: Option<Vec<String>>,
}

impl Scope {
    pub fn new(types: Vec<&'static EntityDescriptor>) -> Self {
        Self {
            types,
            aliases: None,
        }
    }

    /// Single unaliased entity, as used by UPDATE and single-table DELETE.
    pub fn single(entity: &'static EntityDescriptor) -> Self {
        Self::new(vec![entity])
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// Only the first `len` positions stay visible.
    pub fn restrict(&self, len: usize) -> Self {
        let len = len.min(self.types.len());
        Self {
            types: self.types[..len].to_vec(),
            aliases: self
                .aliases
                .as_ref()
                .map(|a| a[..len.min(a.len())].to_vec()),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn entity(&self, position: usize) -> QueryResult<&'static EntityDescriptor> {
        self.types
            .get(position)
            .copied()
            .ok_or(QueryError::PositionOutOfScope {
                position,
                declared: self.types.len(),
            })
    }

    pub fn alias(&self, position: usize) -> Option<&str> {
        self.aliases
            .as_ref()
            .and_then(|a| a.get(position))
            .map(String::as_str)
    }

    pub fn resolve(&self, member: &MemberRef) -> QueryResult<ResolvedMember> {
        let entity = self.entity(member.position)?;
        let descriptor = entity.resolve(&member.name)?;
        Ok(ResolvedMember {
            position: member.position,
            entity,
            member: descriptor,
        })
    }

    /// `alias.[column]`, or `[column]` when the scope carries no aliases.
    pub fn column_tokens(&self, resolved: &ResolvedMember) -> TokenStream {
        let mut ts = TokenStream::new();
        if let Some(alias) = self.alias(resolved.position) {
            ts.push(Token::Alias(alias.to_string())).push(Token::Dot);
        }
        ts.push(Token::Ident(resolved.member.column_name().to_string()));
        ts
    }
}
