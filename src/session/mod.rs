//! Execution layer: runs generated statements through an [`Executor`] and
//! hands back mapped objects.
//!
//! The session adds three behaviors on top of the executor:
//!
//! - multi-row and bulk writes run inside a transaction, the caller's when one
//!   is passed, otherwise a local one that is committed or rolled back here;
//! - a driver error whose code marks a stale cached plan purges the
//!   process-wide caches and retries the statement once;
//! - every driver error is shown to an optional observation hook before it is
//!   returned.
//!
//! # Example
//!
//! ```ignore
//! use quarry::prelude::*;
//!
//! let session = Session::from_settings(executor, &Settings::load()?)?
//!     .on_driver_error(|err, sql, _| eprintln!("{err} while running {sql}"));
//!
//! let clubs: Vec<Club> = session
//!     .query(&QueryShape::of::<Club>().filter(field("IsActive").eq(true)), None)
//!     .await?;
//! ```

mod executor;

use std::future::Future;
use std::sync::Arc;

pub use executor::{DriverError, Executor, Transaction};

use crate::cache;
use crate::config::{ExecutionSettings, Settings, SettingsError};
use crate::error::{QueryError, QueryResult};
use crate::mapping::{Entity, EntityDescriptor, Row};
use crate::materialize::{materialize, materialize_joined};
use crate::sql::{Expr, JoinDescriptor, ParameterSet, QueryShape, SqlGenerator, Statement};

/// Diagnostics hook: the driver error, the SQL text and its parameters.
pub type ErrorObserver = Arc<dyn Fn(&DriverError, &str, &ParameterSet) + Send + Sync>;

pub struct Session<E> {
    executor: E,
    generator: SqlGenerator,
    execution: ExecutionSettings,
    observer: Option<ErrorObserver>,
}

impl<E: Executor> Session<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            generator: SqlGenerator::default(),
            execution: ExecutionSettings::default(),
            observer: None,
        }
    }

    pub fn from_settings(executor: E, settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self {
            executor,
            generator: SqlGenerator::from_settings(settings)?,
            execution: settings.execution.clone(),
            observer: None,
        })
    }

    pub fn with_generator(mut self, generator: SqlGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionSettings) -> Self {
        self.execution = execution;
        self
    }

    /// Install the driver-error observation hook.
    pub fn on_driver_error(
        mut self,
        observer: impl Fn(&DriverError, &str, &ParameterSet) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    // ------------------------------------------------------------------------
    // Driver calls
    // ------------------------------------------------------------------------

    fn observe(&self, err: &DriverError, sql: &str, params: &ParameterSet) {
        tracing::error!(code = err.code, message = %err.message, sql = %sql, "driver error");
        if let Some(observer) = &self.observer {
            observer(err, sql, params);
        }
    }

    fn fail(&self, err: DriverError, what: &str) -> QueryError {
        self.observe(&err, what, &ParameterSet::new());
        err.into()
    }

    /// Run `call`, retrying once after a cache purge when the driver reports a
    /// stale cached plan.
    async fn with_retry<R, F, Fut>(&self, statement: &Statement, mut call: F) -> QueryResult<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, DriverError>>,
    {
        let mut retried = false;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    self.observe(&err, &statement.sql, &statement.params);
                    if !retried && self.execution.is_stale_plan(err.code) {
                        tracing::warn!(code = err.code, "stale cached plan; purging caches and retrying");
                        cache::purge();
                        retried = true;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }

    /// Run one statement and return the affected row count.
    pub async fn execute(
        &self,
        statement: &Statement,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        self.with_retry(statement, || self.executor.execute(statement, transaction))
            .await
    }

    /// Run one statement and return its raw rows.
    pub async fn query_rows(
        &self,
        statement: &Statement,
        transaction: Option<&Transaction>,
    ) -> QueryResult<Vec<Row>> {
        self.with_retry(statement, || self.executor.query(statement, transaction))
            .await
    }

    async fn execute_all(
        &self,
        statements: &[Statement],
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let mut affected = 0;
        for statement in statements {
            affected += self.execute(statement, transaction).await?;
        }
        Ok(affected)
    }

    /// Run `statements` inside the caller's transaction, or inside a local one
    /// that is committed on success and rolled back on failure.
    async fn in_transaction(
        &self,
        statements: &[Statement],
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        if let Some(transaction) = transaction {
            return self.execute_all(statements, Some(transaction)).await;
        }
        if statements.is_empty() {
            return Ok(0);
        }

        let local = self
            .executor
            .begin()
            .await
            .map_err(|err| self.fail(err, "BEGIN TRANSACTION"))?;
        let id = local.id();
        tracing::info!(transaction = id, "opened local transaction");

        match self.execute_all(statements, Some(&local)).await {
            Ok(affected) => {
                self.executor
                    .commit(local)
                    .await
                    .map_err(|err| self.fail(err, "COMMIT"))?;
                tracing::info!(transaction = id, affected, "committed local transaction");
                Ok(affected)
            }
            Err(err) => {
                if let Err(rollback) = self.executor.rollback(local).await {
                    self.observe(&rollback, "ROLLBACK", &ParameterSet::new());
                }
                tracing::info!(transaction = id, "rolled back local transaction");
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Compile, run and materialize a query.
    ///
    /// Joined shapes are reassembled into object graphs; grouped shapes map
    /// each row directly onto `T`.
    pub async fn query<T: Entity>(
        &self,
        shape: &QueryShape,
        transaction: Option<&Transaction>,
    ) -> QueryResult<Vec<T>> {
        let statement = self.generator.select(shape)?;
        let rows = self.query_rows(&statement, transaction).await?;
        if shape.is_grouped() || shape.joins.is_empty() {
            materialize(&rows)
        } else {
            materialize_joined(&rows, &shape.joins, &statement.split)
        }
    }

    /// First object of a query, if any.
    ///
    /// Joined shapes are not limited with `TOP`: that would cut the child rows
    /// of the first root.
    pub async fn first<T: Entity>(
        &self,
        shape: &QueryShape,
        transaction: Option<&Transaction>,
    ) -> QueryResult<Option<T>> {
        let items = if shape.joins.is_empty() && shape.take.is_none() {
            self.query(&shape.clone().take(1), transaction).await?
        } else {
            self.query(shape, transaction).await?
        };
        Ok(items.into_iter().next())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    pub async fn insert<T: Entity>(
        &self,
        item: &T,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.insert(item)?;
        self.execute(&statement, transaction).await
    }

    /// Insert and read the written row back, database-generated values included.
    pub async fn insert_output<T: Entity>(
        &self,
        item: &T,
        transaction: Option<&Transaction>,
    ) -> QueryResult<Option<T>> {
        let statement = self.generator.insert_output(item)?;
        let rows = self.query_rows(&statement, transaction).await?;
        Ok(materialize::<T>(&rows)?.into_iter().next())
    }

    /// Insert each item with its own statement inside one transaction.
    pub async fn insert_many<T: Entity>(
        &self,
        items: &[T],
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statements = self.generator.insert_many(items)?;
        self.in_transaction(&statements, transaction).await
    }

    pub async fn insert_if_absent<T: Entity>(
        &self,
        item: &T,
        absent_when: &Expr,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.insert_if_absent(item, absent_when)?;
        self.execute(&statement, transaction).await
    }

    pub async fn insert_template(
        &self,
        entity: &'static EntityDescriptor,
        template: &Row,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.insert_template(entity, template)?;
        self.execute(&statement, transaction).await
    }

    pub async fn bulk_insert<T: Entity>(
        &self,
        items: &[T],
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.bulk_insert(items)?;
        self.in_transaction(std::slice::from_ref(&statement), transaction)
            .await
    }

    pub async fn update(
        &self,
        entity: &'static EntityDescriptor,
        values: &Row,
        predicate: &Expr,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.update(entity, values, predicate)?;
        self.execute(&statement, transaction).await
    }

    pub async fn upsert(
        &self,
        entity: &'static EntityDescriptor,
        values: &Row,
        predicate: &Expr,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.upsert(entity, values, predicate)?;
        self.execute(&statement, transaction).await
    }

    pub async fn bulk_update<T: Entity>(
        &self,
        items: &[T],
        match_on: &Expr,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.bulk_update(items, match_on)?;
        self.in_transaction(std::slice::from_ref(&statement), transaction)
            .await
    }

    pub async fn bulk_upsert<T: Entity>(
        &self,
        items: &[T],
        match_on: &Expr,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.bulk_upsert(items, match_on)?;
        self.in_transaction(std::slice::from_ref(&statement), transaction)
            .await
    }

    pub async fn delete(
        &self,
        entity: &'static EntityDescriptor,
        predicate: &Expr,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.delete(entity, predicate)?;
        self.execute(&statement, transaction).await
    }

    pub async fn delete_joined(
        &self,
        entity: &'static EntityDescriptor,
        joins: &[JoinDescriptor],
        predicate: &Expr,
        transaction: Option<&Transaction>,
    ) -> QueryResult<u64> {
        let statement = self.generator.delete_joined(entity, joins, predicate)?;
        self.execute(&statement, transaction).await
    }
}
