//! # Quarry
//!
//! A typed query compiler for SQL Server. Predicates, selectors, joins and
//! groupings over mapped entity types compile into parameterized T-SQL, and
//! flat join results are reassembled into nested object graphs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │        QueryShape / DML request over mapped entities      │
//! └──────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql: predicate, selector, join]
//! ┌──────────────────────────────────────────────────────────┐
//! │     Statement { sql, params, table_parameter, split }     │
//! └──────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [session → Executor]
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Vec<Row>                            │
//! └──────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [materialize]
//! ┌──────────────────────────────────────────────────────────┐
//! │               Vec<T> with nested children                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`mapping`] - entity descriptors, values and rows
//! - [`sql`] - statement generation
//! - [`materialize`] - rows → object graphs
//! - [`session`] - execution through an [`session::Executor`]
//! - [`cache`] - process-wide setter and required-column caches
//! - [`config`] - TOML settings and connection topology
//! - [`error`] - error taxonomy

pub mod cache;
pub mod config;
pub mod error;
pub mod mapping;
pub mod materialize;
pub mod session;
pub mod sql;

pub use error::{ErrorCategory, QueryError, QueryResult};

/// Everything needed to declare entities, build shapes and run them.
pub mod prelude {
    pub use crate::config::{ConnectionLocator, ConnectionRegistry, Settings};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::mapping::{Entity, EntityDescriptor, FromValue, Key, MemberDescriptor, Row, Value};
    pub use crate::session::{DriverError, Executor, Session, Transaction};
    pub use crate::sql::expr::{
        avg, count, field, list, max, member, min, null, output, sum, val, ExprExt,
    };
    pub use crate::sql::{
        Expr, GroupProjection, JoinDescriptor, OrderBy, QueryShape, Selector, SqlGenerator,
        Statement,
    };
}
