//! The seam to a physical database driver.

use async_trait::async_trait;
use thiserror::Error;

use crate::mapping::Row;
use crate::sql::Statement;

/// Error reported by the driver, carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("driver error {code}: {message}")]
pub struct DriverError {
    /// Server error number.
    pub code: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Handle of a transaction opened by an [`Executor`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Runs generated statements against a database.
///
/// Implementations own connections and translate driver failures into
/// [`DriverError`]. When a statement carries a table-valued parameter the
/// executor ships its rows alongside the scalar parameters. Executors that do
/// not understand `{=Name}` placeholders should expand them with
/// [`ParameterSet::expand_inline`](crate::sql::ParameterSet::expand_inline).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement and return the affected row count.
    async fn execute(
        &self,
        statement: &Statement,
        transaction: Option<&Transaction>,
    ) -> Result<u64, DriverError>;

    /// Run a statement and return its rows, column names included.
    async fn query(
        &self,
        statement: &Statement,
        transaction: Option<&Transaction>,
    ) -> Result<Vec<Row>, DriverError>;

    async fn begin(&self) -> Result<Transaction, DriverError>;

    async fn commit(&self, transaction: Transaction) -> Result<(), DriverError>;

    async fn rollback(&self, transaction: Transaction) -> Result<(), DriverError>;
}
