//! Error taxonomy for statement generation and execution.

use thiserror::Error;

use crate::config::SettingsError;
use crate::session::DriverError;

/// Result type for everything that compiles or executes statements.
pub type QueryResult<T> = Result<T, QueryError>;

/// Broad class of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The query shape cannot be compiled. Raised before any I/O.
    Shape,
    /// The joined tables cannot be reached from one server.
    Topology,
    /// The driver or the materializer failed.
    Execution,
    /// Settings could not be loaded.
    Config,
}

/// Errors raised while compiling or running a statement.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("member `{member}` of `{entity}` is not mapped")]
    NotMapped { entity: String, member: String },

    #[error("`{entity}` has no member named `{member}`")]
    UnknownMember { entity: String, member: String },

    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("parameter position {position} is not declared (only {declared} in scope)")]
    PositionOutOfScope { position: usize, declared: usize },

    #[error("a NULL comparison cannot be combined inside AND/OR")]
    NullInComposite,

    #[error("selector is empty")]
    EmptySelector,

    #[error("selected columns must cover all joined tables; `{0}` contributed none")]
    UncoveredJoin(String),

    #[error("grouping columns and grouping projection must be declared together")]
    GroupingMismatch,

    #[error("join to `{0}` has no join condition")]
    MissingJoinCondition(String),

    #[error("join to `{entity}` targets position {parent}, which is not declared before it")]
    InvalidNavigation { entity: String, parent: usize },

    #[error("joins must span 2 to 7 tables, got {0}")]
    JoinFanOut(usize),

    #[error("{clause} row count {value} does not fit a BIGINT")]
    RowCountOutOfRange { clause: &'static str, value: u64 },

    #[error("missing required columns for `{entity}`: {}", columns.join(", "))]
    MissingRequiredColumns {
        entity: String,
        columns: Vec<String>,
    },

    #[error("`{0}` declares no user-defined table type for bulk operations")]
    MissingTableType(String),

    #[error("no rows supplied for a bulk operation on `{0}`")]
    EmptyBulk(String),

    #[error("connection `{0}` is not declared")]
    ConnectionNotDeclared(String),

    #[error("`{0}` declares no connection and more than one is configured")]
    AmbiguousConnection(String),

    #[error("`{base}` and `{joined}` live on different database servers")]
    DifferentServer { base: String, joined: String },

    #[error("`{joined}` declares no database, so it cannot be joined from `{base}` in another database")]
    UnknownDatabase { base: String, joined: String },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("cannot materialize result: {0}")]
    Materialize(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl QueryError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueryError::DifferentServer { .. } | QueryError::UnknownDatabase { .. } => {
                ErrorCategory::Topology
            }
            QueryError::Driver(_) | QueryError::Materialize(_) => ErrorCategory::Execution,
            QueryError::Settings(_) => ErrorCategory::Config,
            _ => ErrorCategory::Shape,
        }
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        QueryError::UnsupportedExpression(what.into())
    }
}
