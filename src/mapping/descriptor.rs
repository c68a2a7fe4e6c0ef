//! Entity and member descriptors.
//!
//! Descriptors are plain consts so a mapping layer (derive macro or hand
//! written) can register a type once:
//!
//! ```ignore
//! const CLUB: EntityDescriptor = EntityDescriptor::new(
//!     "Club",
//!     &[
//!         MemberDescriptor::new("Id").key().identity(),
//!         MemberDescriptor::new("Name").type_name("varchar").length(64).required(),
//!         MemberDescriptor::new("IsActive"),
//!     ],
//! )
//! .connection("main");
//! ```

use crate::error::{QueryError, QueryResult};

/// Column-level mapping for one member of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: &'static str,
    pub column: Option<&'static str>,
    pub type_name: Option<&'static str>,
    /// Declared maximum length; `None` means unbounded.
    pub length: Option<u32>,
    pub required: bool,
    pub not_mapped: bool,
    pub key: bool,
    /// Generated by the database on insert.
    pub identity: bool,
}

impl MemberDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            type_name: None,
            length: None,
            required: false,
            not_mapped: false,
            key: false,
            identity: false,
        }
    }

    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub const fn type_name(mut self, type_name: &'static str) -> Self {
        self.type_name = Some(type_name);
        self
    }

    pub const fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn not_mapped(mut self) -> Self {
        self.not_mapped = true;
        self
    }

    pub const fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Physical column name.
    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }

    /// SQL type used when the column is rendered as a typed placeholder.
    pub fn sql_type(&self) -> String {
        self.type_name.unwrap_or("int").to_uppercase()
    }
}

/// Table-level mapping for an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub type_name: &'static str,
    pub table: Option<&'static str>,
    pub schema: Option<&'static str>,
    /// Name of the connection in the registry.
    pub connection: Option<&'static str>,
    pub members: &'static [MemberDescriptor],
    /// User-defined table type used by bulk operations.
    pub table_type: Option<&'static str>,
}

impl EntityDescriptor {
    pub const fn new(type_name: &'static str, members: &'static [MemberDescriptor]) -> Self {
        Self {
            type_name,
            table: None,
            schema: None,
            connection: None,
            members,
            table_type: None,
        }
    }

    pub const fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    pub const fn schema(mut self, schema: &'static str) -> Self {
        self.schema = Some(schema);
        self
    }

    pub const fn connection(mut self, connection: &'static str) -> Self {
        self.connection = Some(connection);
        self
    }

    pub const fn table_type(mut self, table_type: &'static str) -> Self {
        self.table_type = Some(table_type);
        self
    }

    pub fn table_name(&self) -> &'static str {
        self.table.unwrap_or(self.type_name)
    }

    pub fn member(&self, name: &str) -> Option<&'static MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Look up a member that is allowed to appear in SQL.
    pub fn resolve(&self, name: &str) -> QueryResult<&'static MemberDescriptor> {
        let member = self.member(name).ok_or_else(|| QueryError::UnknownMember {
            entity: self.type_name.to_string(),
            member: name.to_string(),
        })?;
        if member.not_mapped {
            return Err(QueryError::NotMapped {
                entity: self.type_name.to_string(),
                member: name.to_string(),
            });
        }
        Ok(member)
    }

    pub fn mapped_members(&self) -> impl Iterator<Item = &'static MemberDescriptor> {
        self.members.iter().filter(|m| !m.not_mapped)
    }

    /// Members written by INSERT statements.
    pub fn insertable_members(&self) -> impl Iterator<Item = &'static MemberDescriptor> {
        self.mapped_members().filter(|m| !m.identity)
    }

    pub fn key_members(&self) -> impl Iterator<Item = &'static MemberDescriptor> {
        self.mapped_members().filter(|m| m.key)
    }

    pub fn key_member(&self) -> Option<&'static MemberDescriptor> {
        self.key_members().next()
    }

    /// Table-type name for bulk paths.
    pub fn require_table_type(&self) -> QueryResult<&'static str> {
        self.table_type
            .ok_or_else(|| QueryError::MissingTableType(self.type_name.to_string()))
    }
}
