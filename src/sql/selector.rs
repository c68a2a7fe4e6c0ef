//! Selector and projection compiler.
//!
//! Turns member lists into select lists (with the split plan used to cut
//! joined rows apart), OUTPUT lists, GROUP BY lists and grouping projections.

use super::expr::{AggregateFunc, Expr};
use super::scope::{ResolvedMember, Scope};
use super::token::{Token, TokenStream};
use crate::error::{QueryError, QueryResult};
use crate::mapping::EntityDescriptor;

// =============================================================================
// Inputs
// =============================================================================

/// One selected member, optionally renamed (member initializer).
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub rename: Option<String>,
}

/// Ordered list of selected members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    items: Vec<SelectItem>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(mut self, expr: Expr) -> Self {
        self.items.push(SelectItem { expr, rename: None });
        self
    }

    pub fn renamed(mut self, expr: Expr, name: &str) -> Self {
        self.items.push(SelectItem {
            expr,
            rename: Some(name.to_string()),
        });
        self
    }

    pub fn items(&self) -> &[SelectItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Projection of a grouped query: named aggregates and grouping columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupProjection {
    items: Vec<(String, Expr)>,
}

impl GroupProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, expr: Expr) -> Self {
        self.items.push((name.to_string(), expr));
        self
    }

    pub fn items(&self) -> &[(String, Expr)] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// A column in a compiled select list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedColumn {
    pub source: ResolvedMember,
    /// Name the column carries in result rows.
    pub output: String,
}

/// Where a joined table's columns begin in a flat row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPoint {
    pub position: usize,
    pub column: String,
    pub offset: usize,
}

/// One split point per joined table after the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitPlan {
    points: Vec<SplitPoint>,
}

impl SplitPlan {
    pub fn new(points: Vec<SplitPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[SplitPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Comma-separated split column names, as drivers expect them.
    pub fn split_on(&self) -> String {
        self.points
            .iter()
            .map(|p| p.column.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `(start, end)` column ranges of each table in a row of `width` columns.
    pub fn ranges(&self, width: usize) -> QueryResult<Vec<(usize, usize)>> {
        let mut bounds = Vec::with_capacity(self.points.len() + 2);
        bounds.push(0);
        for point in &self.points {
            let last = bounds.last().copied().unwrap_or(0);
            if point.offset <= last || point.offset >= width {
                return Err(QueryError::Materialize(format!(
                    "split column `{}` at offset {} does not fit a row of {} columns",
                    point.column, point.offset, width
                )));
            }
            bounds.push(point.offset);
        }
        bounds.push(width);
        Ok(bounds.windows(2).map(|w| (w[0], w[1])).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectList {
    pub sql: TokenStream,
    pub columns: Vec<SelectedColumn>,
    pub split: SplitPlan,
}

/// A named column in a grouping projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    pub name: String,
    /// The grouped member for passthrough columns.
    pub source: Option<ResolvedMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub sql: TokenStream,
    pub columns: Vec<ProjectedColumn>,
}

// =============================================================================
// Select lists
// =============================================================================

fn selector_member<'e>(expr: &'e Expr) -> QueryResult<&'e super::expr::MemberRef> {
    expr.as_member().ok_or_else(|| {
        QueryError::unsupported(format!(
            "selector item must be a member, found {}",
            expr.describe()
        ))
    })
}

/// `col` or `col AS [name]` when the row key differs from the column.
fn aliased_column(scope: &Scope, resolved: &ResolvedMember, output: &str) -> TokenStream {
    let mut ts = scope.column_tokens(resolved);
    if resolved.member.column_name() != output {
        ts.space().keyword(Token::As).push(Token::Ident(output.to_string()));
    }
    ts
}

/// Compile the select list of a query over `scope`.
///
/// Without a selector every mapped member of every table is selected. With
/// more than one table the columns are grouped by table and every joined
/// table must contribute at least one.
pub fn select_list(selector: Option<&Selector>, scope: &Scope) -> QueryResult<SelectList> {
    let mut columns = Vec::new();
    match selector {
        None => {
            for position in 0..scope.len() {
                let entity = scope.entity(position)?;
                for member in entity.mapped_members() {
                    columns.push(SelectedColumn {
                        source: ResolvedMember {
                            position,
                            entity,
                            member,
                        },
                        output: member.name.to_string(),
                    });
                }
            }
        }
        Some(selector) if selector.is_empty() => return Err(QueryError::EmptySelector),
        Some(selector) => {
            for item in selector.items() {
                let source = scope.resolve(selector_member(&item.expr)?)?;
                let output = item
                    .rename
                    .clone()
                    .unwrap_or_else(|| source.member.name.to_string());
                columns.push(SelectedColumn { source, output });
            }
        }
    }

    // Stable: keeps selector order within a table.
    columns.sort_by_key(|c| c.source.position);

    let mut points = Vec::new();
    for position in 1..scope.len() {
        let offset = columns
            .iter()
            .position(|c| c.source.position == position)
            .ok_or_else(|| {
                QueryError::UncoveredJoin(
                    scope
                        .entity(position)
                        .map(|e| e.type_name.to_string())
                        .unwrap_or_default(),
                )
            })?;
        points.push(SplitPoint {
            position,
            column: columns[offset].output.clone(),
            offset,
        });
    }

    let items: Vec<TokenStream> = columns
        .iter()
        .map(|c| aliased_column(scope, &c.source, &c.output))
        .collect();
    let mut sql = TokenStream::new();
    sql.append_list(&items);

    Ok(SelectList {
        sql,
        columns,
        split: SplitPlan::new(points),
    })
}

/// OUTPUT list of an insert: identity members become typed zero placeholders.
pub fn output_list(entity: &EntityDescriptor) -> TokenStream {
    let items: Vec<TokenStream> = entity
        .mapped_members()
        .map(|member| {
            let mut ts = TokenStream::new();
            if member.identity {
                ts.push(Token::Cast)
                    .lparen()
                    .push(Token::LitInt(0))
                    .space()
                    .keyword(Token::As)
                    .push(Token::TypeName(member.sql_type()))
                    .rparen()
                    .space()
                    .keyword(Token::As)
                    .push(Token::Ident(member.name.to_string()));
            } else {
                ts.push(Token::Inserted)
                    .push(Token::Dot)
                    .push(Token::Ident(member.column_name().to_string()));
                if member.column_name() != member.name {
                    ts.space()
                        .keyword(Token::As)
                        .push(Token::Ident(member.name.to_string()));
                }
            }
            ts
        })
        .collect();
    let mut sql = TokenStream::new();
    sql.append_list(&items);
    sql
}

// =============================================================================
// Grouping
// =============================================================================

/// Compile the GROUP BY column list. Only plain members are accepted.
pub fn grouping_columns(
    exprs: &[Expr],
    scope: &Scope,
) -> QueryResult<(TokenStream, Vec<ResolvedMember>)> {
    let mut resolved = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let member = expr.as_member().ok_or_else(|| {
            QueryError::unsupported(format!(
                "grouping column must be a member, found {}",
                expr.describe()
            ))
        })?;
        resolved.push(scope.resolve(member)?);
    }
    let items: Vec<TokenStream> = resolved.iter().map(|r| scope.column_tokens(r)).collect();
    let mut sql = TokenStream::new();
    sql.append_list(&items);
    Ok((sql, resolved))
}

fn aggregate_tokens(
    func: AggregateFunc,
    arg: Option<&Expr>,
    scope: &Scope,
) -> QueryResult<TokenStream> {
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName(func.name().to_string())).lparen();
    match (func, arg) {
        (AggregateFunc::Count, None) => {
            ts.push(Token::Star);
        }
        (_, None) => {
            return Err(QueryError::unsupported(format!(
                "{} needs an argument",
                func.name()
            )))
        }
        (_, Some(arg)) => {
            let member = arg.as_member().ok_or_else(|| {
                QueryError::unsupported(format!(
                    "aggregate argument must be a member, found {}",
                    arg.describe()
                ))
            })?;
            let resolved = scope.resolve(member)?;
            let column = scope.column_tokens(&resolved);
            if func == AggregateFunc::Avg {
                ts.push(Token::Cast)
                    .lparen()
                    .append(&column)
                    .space()
                    .keyword(Token::As)
                    .push(Token::TypeName("decimal".into()))
                    .lparen()
                    .push(Token::LitInt(38))
                    .comma()
                    .space()
                    .push(Token::LitInt(6))
                    .rparen()
                    .rparen();
            } else {
                ts.append(&column);
            }
        }
    }
    ts.rparen();
    Ok(ts)
}

/// Compile the projection of a grouped query.
///
/// Items are aggregates over members or passthroughs of grouping columns.
/// Conversions are rejected.
pub fn grouping_projection(
    projection: &GroupProjection,
    grouped: &[ResolvedMember],
    scope: &Scope,
) -> QueryResult<Projection> {
    if projection.is_empty() {
        return Err(QueryError::EmptySelector);
    }
    let mut items = Vec::with_capacity(projection.items().len());
    let mut columns = Vec::with_capacity(projection.items().len());

    for (name, expr) in projection.items() {
        let (mut ts, source) = match expr {
            Expr::Aggregate { func, arg } => {
                (aggregate_tokens(*func, arg.as_deref(), scope)?, None)
            }
            Expr::Member(member) => {
                let resolved = scope.resolve(member)?;
                if !grouped.contains(&resolved) {
                    return Err(QueryError::unsupported(format!(
                        "`{}` is projected but not grouped",
                        member.name
                    )));
                }
                (scope.column_tokens(&resolved), Some(resolved))
            }
            other => {
                return Err(QueryError::unsupported(format!(
                    "grouping projection item must be an aggregate or member, found {}",
                    other.describe()
                )))
            }
        };
        ts.space().keyword(Token::As).push(Token::Ident(name.clone()));
        items.push(ts);
        columns.push(ProjectedColumn {
            name: name.clone(),
            source,
        });
    }

    let mut sql = TokenStream::new();
    sql.append_list(&items);
    Ok(Projection { sql, columns })
}
