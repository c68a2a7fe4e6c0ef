//! Mapping layer: how entity types describe their table and columns.
//!
//! The core never discovers metadata on its own. Each mapped type implements
//! [`Entity`], handing out a const [`EntityDescriptor`] plus row conversions.

mod descriptor;
mod value;

pub use descriptor::{EntityDescriptor, MemberDescriptor};
pub use value::{FromValue, Key, Row, Value};

use crate::error::QueryResult;

/// A type mapped onto one table.
///
/// Row keys are member names: the SELECT assembler aliases overridden column
/// names back to their member name.
pub trait Entity: Sized + Send + 'static {
    fn descriptor() -> &'static EntityDescriptor;

    fn from_row(row: &Row) -> QueryResult<Self>;

    fn to_row(&self) -> Row;

    /// Identity used for one-to-many deduplication.
    ///
    /// `None` when the type has no key member or the key is its type default,
    /// in which case every occurrence counts as a distinct object.
    fn key(&self) -> Option<Key> {
        let member = Self::descriptor().key_member()?;
        self.to_row().value(member.name).and_then(Value::to_key)
    }
}
