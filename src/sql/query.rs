//! SELECT assembly from a [`QueryShape`].

use std::sync::Arc;

use super::dml::TableParameter;
use super::expr::{Expr, ExprExt};
use super::join::{aliases_for, join_clauses, table_token, validate_chain, JoinDescriptor};
use super::params::ParameterSet;
use super::predicate::compile_predicate;
use super::scope::Scope;
use super::selector::{
    grouping_columns, grouping_projection, select_list, GroupProjection, ProjectedColumn,
    Selector, SplitPlan,
};
use super::token::{Token, TokenStream};
use crate::config::{ConnectionRegistry, GeneratorSettings, Settings, SettingsError};
use crate::error::{QueryError, QueryResult};
use crate::mapping::{Entity, EntityDescriptor};

/// Name of the derived table that wraps grouped queries.
const GROUPED_TABLE: &str = "__T__";

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderBy {
    pub expr: Expr,
    pub dir: SortDir,
}

impl OrderBy {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Desc,
        }
    }

    fn dir_token(&self) -> Token {
        match self.dir {
            SortDir::Asc => Token::Asc,
            SortDir::Desc => Token::Desc,
        }
    }
}

// =============================================================================
// Query shape
// =============================================================================

/// Everything a SELECT needs: root, joins, filter, ordering, projection
/// and paging.
#[derive(Debug, Clone)]
#[must_use = "QueryShape has no effect until compiled with SqlGenerator::select()"]
pub struct QueryShape {
    pub root: &'static EntityDescriptor,
    pub joins: Vec<JoinDescriptor>,
    pub predicate: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub selector: Option<Selector>,
    pub group_by: Vec<Expr>,
    pub projection: Option<GroupProjection>,
    pub distinct: bool,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    /// Overrides the generator's dirty-read setting.
    pub dirty_read: Option<bool>,
}

impl QueryShape {
    pub fn new(root: &'static EntityDescriptor) -> Self {
        Self {
            root,
            joins: Vec::new(),
            predicate: None,
            order_by: Vec::new(),
            selector: None,
            group_by: Vec::new(),
            projection: None,
            distinct: false,
            skip: None,
            take: None,
            dirty_read: None,
        }
    }

    pub fn of<T: Entity>() -> Self {
        Self::new(T::descriptor())
    }

    pub fn join(mut self, join: JoinDescriptor) -> Self {
        self.joins.push(join);
        self
    }

    /// Add a filter; repeated filters are ANDed.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn select(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn group_by(mut self, columns: Vec<Expr>, projection: GroupProjection) -> Self {
        self.group_by = columns;
        self.projection = Some(projection);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn dirty_read(mut self, dirty_read: bool) -> Self {
        self.dirty_read = Some(dirty_read);
        self
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    fn entities(&self) -> Vec<&'static EntityDescriptor> {
        std::iter::once(self.root)
            .chain(self.joins.iter().map(|j| j.entity))
            .collect()
    }
}

// =============================================================================
// Statement
// =============================================================================

/// A generated statement ready for an executor.
///
/// `sql` may hold several `;`-separated statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: ParameterSet,
    /// Rows shipped as one table-valued parameter (bulk paths).
    pub table_parameter: Option<TableParameter>,
    /// Where joined tables begin in result rows. Empty for single tables.
    pub split: SplitPlan,
}

impl Statement {
    pub fn new(sql: String, params: ParameterSet) -> Self {
        Self {
            sql,
            params,
            table_parameter: None,
            split: SplitPlan::default(),
        }
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Compiles query shapes and modification requests into T-SQL.
///
/// Holds only configuration; every call is independent.
#[derive(Debug, Clone, Default)]
pub struct SqlGenerator {
    pub(crate) settings: GeneratorSettings,
    pub(crate) registry: Option<Arc<ConnectionRegistry>>,
}

impl SqlGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self {
            settings,
            registry: None,
        }
    }

    /// Generator options plus the connection registry from loaded settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self {
            settings: settings.generator.clone(),
            registry: Some(Arc::new(ConnectionRegistry::from_settings(settings)?)),
        })
    }

    pub fn with_registry(mut self, registry: ConnectionRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub(crate) fn new_params(&self) -> ParameterSet {
        ParameterSet::with_inline_numeric(self.settings.inline_numeric_parameters)
    }

    pub(crate) fn registry(&self) -> Option<&ConnectionRegistry> {
        self.registry.as_deref()
    }

    pub(crate) fn dirty_read(&self) -> bool {
        self.settings.dirty_read
    }

    /// Compile a SELECT.
    pub fn select(&self, shape: &QueryShape) -> QueryResult<Statement> {
        validate_chain(&shape.joins)?;
        if shape.group_by.is_empty() != shape.projection.is_none() {
            return Err(QueryError::GroupingMismatch);
        }

        let entities = shape.entities();
        let scope = Scope::new(entities.clone()).with_aliases(aliases_for(&entities));
        let dirty_read = shape.dirty_read.unwrap_or(self.settings.dirty_read);
        let mut params = self.new_params();
        let grouped = shape.is_grouped();

        let mut split = SplitPlan::default();
        let mut projected = Vec::new();
        let mut group_sql = TokenStream::new();
        let columns = match &shape.projection {
            Some(projection) if grouped => {
                let (sql, members) = grouping_columns(&shape.group_by, &scope)?;
                group_sql = sql;
                let compiled = grouping_projection(projection, &members, &scope)?;
                projected = compiled.columns;
                compiled.sql
            }
            _ => {
                let list = select_list(shape.selector.as_ref(), &scope)?;
                split = list.split;
                list.sql
            }
        };

        let mut ts = TokenStream::new();
        ts.keyword(Token::Select);
        if shape.distinct {
            ts.keyword(Token::Distinct);
        }
        if !grouped {
            push_top(&mut ts, shape)?;
        }
        ts.append(&columns)
            .space()
            .keyword(Token::From)
            .push(table_token(shape.root));
        if let Some(alias) = scope.alias(0) {
            ts.space().push(Token::Alias(alias.to_string()));
        }
        if dirty_read {
            ts.space().push(Token::NoLock);
        }
        ts.append(&join_clauses(
            shape.root,
            &shape.joins,
            &scope,
            self.registry(),
            dirty_read,
            &mut params,
        )?);

        if let Some(predicate) = &shape.predicate {
            let compiled = compile_predicate(predicate, &scope, &mut params)?;
            ts.space().keyword(Token::Where).append(&compiled.sql);
        }

        if grouped {
            ts.space().keyword(Token::GroupBy).append(&group_sql);

            let mut outer = TokenStream::new();
            outer.keyword(Token::Select);
            push_top(&mut outer, shape)?;
            outer
                .push(Token::Star)
                .space()
                .keyword(Token::From)
                .lparen()
                .append(&ts)
                .rparen()
                .space()
                .push(Token::Ident(GROUPED_TABLE.to_string()));
            let orders = grouped_orderings(&shape.order_by, &projected, &scope)?;
            push_ordering(&mut outer, &orders, shape)?;
            ts = outer;
        } else {
            let orders = orderings(&shape.order_by, &scope)?;
            push_ordering(&mut ts, &orders, shape)?;
        }

        let sql = ts.serialize();
        tracing::debug!(sql = %sql, params = params.len(), "assembled select");
        Ok(Statement {
            sql,
            params,
            table_parameter: None,
            split,
        })
    }
}

/// Row counts are emitted as BIGINT literals.
fn row_count(clause: &'static str, value: u64) -> QueryResult<Token> {
    i64::try_from(value)
        .map(Token::LitInt)
        .map_err(|_| QueryError::RowCountOutOfRange { clause, value })
}

/// `TOP(n) ` when only `take` is set.
fn push_top(ts: &mut TokenStream, shape: &QueryShape) -> QueryResult<()> {
    if let (Some(take), None) = (shape.take, shape.skip) {
        ts.push(Token::Top)
            .lparen()
            .push(row_count("TOP", take)?)
            .rparen()
            .space();
    }
    Ok(())
}

fn orderings(order_by: &[OrderBy], scope: &Scope) -> QueryResult<Vec<TokenStream>> {
    order_by
        .iter()
        .map(|order| {
            let member = order.expr.as_member().ok_or_else(|| {
                QueryError::unsupported(format!(
                    "ordering must be a member, found {}",
                    order.expr.describe()
                ))
            })?;
            let resolved = scope.resolve(member)?;
            let mut ts = scope.column_tokens(&resolved);
            ts.space().push(order.dir_token());
            Ok(ts)
        })
        .collect()
}

/// Orderings of a grouped query refer to projection output names.
fn grouped_orderings(
    order_by: &[OrderBy],
    projected: &[ProjectedColumn],
    scope: &Scope,
) -> QueryResult<Vec<TokenStream>> {
    order_by
        .iter()
        .map(|order| {
            let name = match &order.expr {
                Expr::Output(name) => projected
                    .iter()
                    .find(|c| &c.name == name)
                    .map(|c| c.name.clone()),
                Expr::Member(member) => {
                    let resolved = scope.resolve(member)?;
                    projected
                        .iter()
                        .find(|c| c.source == Some(resolved))
                        .map(|c| c.name.clone())
                }
                _ => None,
            }
            .ok_or_else(|| {
                QueryError::unsupported(format!(
                    "ordering of a grouped query must name a projected column, found {}",
                    order.expr.describe()
                ))
            })?;
            let mut ts = TokenStream::from(Token::Ident(name));
            ts.space().push(order.dir_token());
            Ok(ts)
        })
        .collect()
}

/// ORDER BY plus OFFSET/FETCH when `skip` is set.
fn push_ordering(
    ts: &mut TokenStream,
    orders: &[TokenStream],
    shape: &QueryShape,
) -> QueryResult<()> {
    let Some(skip) = shape.skip else {
        if !orders.is_empty() {
            ts.space().keyword(Token::OrderBy).append_list(orders);
        }
        return Ok(());
    };
    let skip = row_count("OFFSET", skip)?;
    let take = shape.take.map(|take| row_count("FETCH", take)).transpose()?;

    ts.space().keyword(Token::OrderBy);
    if orders.is_empty() {
        ts.lparen().keyword(Token::Select).push(Token::Null).rparen();
    } else {
        ts.append_list(orders);
    }
    ts.space()
        .keyword(Token::Offset)
        .push(skip)
        .space()
        .push(Token::Rows);
    if let Some(take) = take {
        ts.space()
            .keyword(Token::Fetch)
            .keyword(Token::Next)
            .push(take)
            .space()
            .keyword(Token::Rows)
            .push(Token::Only);
    }
    Ok(())
}
