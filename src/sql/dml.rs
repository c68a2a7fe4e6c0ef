//! INSERT, UPDATE, UPSERT and DELETE assembly, including the bulk paths that
//! ship their rows as one table-valued parameter.
//!
//! # Examples
//!
//! ```ignore
//! use quarry::mapping::Row;
//! use quarry::sql::expr::{field, ExprExt};
//!
//! let gen = SqlGenerator::default();
//!
//! // INSERT INTO [Club] ([Name], [IsActive]) VALUES (@Name, @IsActive)
//! let insert = gen.insert(&club)?;
//!
//! // UPDATE [Club] SET [Name] = @Name WHERE [Id] = @Id;
//! // IF @@ROWCOUNT = 0 INSERT INTO [Club] ([Name]) VALUES (@Name)
//! let upsert = gen.upsert(Club::descriptor(), &Row::new().with("Name", "Lions"), &field("Id").eq(7))?;
//!
//! // DELETE FROM [Club] WHERE [IsActive] = 0
//! let delete = gen.delete(Club::descriptor(), &field("IsActive").not())?;
//! ```

use serde::Serialize;

use super::expr::Expr;
use super::join::{alias_for, aliases_for, join_clauses, table_token, JoinDescriptor};
use super::params::ParameterSet;
use super::predicate::compile_predicate;
use super::query::{SqlGenerator, Statement};
use super::scope::Scope;
use super::selector::output_list;
use super::token::{Token, TokenStream};
use crate::cache;
use crate::error::{QueryError, QueryResult};
use crate::mapping::{Entity, EntityDescriptor, MemberDescriptor, Row, Value};

/// Alias of the table-valued parameter inside bulk statements.
const SOURCE_ALIAS: &str = "src";

// ============================================================================
// Table-valued parameter
// ============================================================================

/// Rows shipped to the server as one user-defined table type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableParameter {
    /// Parameter name without the `@`.
    pub name: String,
    /// User-defined table type.
    pub type_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableParameter {
    fn from_entities<T: Entity>(
        entity: &'static EntityDescriptor,
        members: &[&'static MemberDescriptor],
        items: &[T],
    ) -> QueryResult<Self> {
        let type_name = entity.require_table_type()?;
        if items.is_empty() {
            return Err(QueryError::EmptyBulk(entity.type_name.to_string()));
        }
        let rows = items
            .iter()
            .map(|item| {
                let row = item.to_row();
                members
                    .iter()
                    .map(|m| row.value(m.name).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok(Self {
            name: format!("{}Rows", entity.type_name),
            type_name: type_name.to_string(),
            columns: members.iter().map(|m| m.column_name().to_string()).collect(),
            rows,
        })
    }

    /// JSON payload for executors that ship table-valued parameters as text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn token(&self) -> Token {
        Token::Param(self.name.clone())
    }
}

// ============================================================================
// Assignments
// ============================================================================

/// One column with the placeholder bound to it. UPDATE and the fallback
/// INSERT of an UPSERT render from the same list.
#[derive(Debug, Clone, PartialEq)]
struct Assignment {
    member: &'static MemberDescriptor,
    placeholder: Token,
}

fn assign(
    member: &'static MemberDescriptor,
    value: Value,
    params: &mut ParameterSet,
) -> Assignment {
    Assignment {
        member,
        placeholder: params.add(member.name, value, Some(member)),
    }
}

/// Assignments for explicitly named values, in row order.
fn named_assignments(
    entity: &'static EntityDescriptor,
    values: &Row,
    params: &mut ParameterSet,
) -> QueryResult<Vec<Assignment>> {
    let mut out = Vec::with_capacity(values.len());
    for (name, value) in values.iter() {
        let member = entity.resolve(name)?;
        out.push(assign(member, value.clone(), params));
    }
    if out.is_empty() {
        return Err(QueryError::unsupported(format!(
            "no columns assigned for `{}`",
            entity.type_name
        )));
    }
    Ok(out)
}

/// Assignments for every insertable member of an entity value.
fn entity_assignments<T: Entity>(item: &T, params: &mut ParameterSet) -> QueryResult<Vec<Assignment>> {
    let entity = T::descriptor();
    let row = item.to_row();
    let out: Vec<Assignment> = entity
        .insertable_members()
        .map(|member| {
            let value = row.value(member.name).cloned().unwrap_or(Value::Null);
            assign(member, value, params)
        })
        .collect();
    if out.is_empty() {
        return Err(QueryError::unsupported(format!(
            "`{}` has no insertable members",
            entity.type_name
        )));
    }
    Ok(out)
}

fn column(member: &MemberDescriptor, alias: Option<&str>) -> TokenStream {
    let mut ts = TokenStream::new();
    if let Some(alias) = alias {
        ts.push(Token::Alias(alias.to_string())).push(Token::Dot);
    }
    ts.push(Token::Ident(member.column_name().to_string()));
    ts
}

fn column_list<'m>(
    members: impl IntoIterator<Item = &'m MemberDescriptor>,
    alias: Option<&str>,
) -> TokenStream {
    let items: Vec<TokenStream> = members.into_iter().map(|m| column(m, alias)).collect();
    let mut ts = TokenStream::new();
    ts.append_list(&items);
    ts
}

fn placeholder_list(assignments: &[Assignment]) -> TokenStream {
    let items: Vec<TokenStream> = assignments
        .iter()
        .map(|a| TokenStream::from(a.placeholder.clone()))
        .collect();
    let mut ts = TokenStream::new();
    ts.append_list(&items);
    ts
}

/// `INSERT INTO <table> (<cols>) `
fn insert_head<'m>(
    entity: &EntityDescriptor,
    members: impl IntoIterator<Item = &'m MemberDescriptor>,
) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.keyword(Token::Insert)
        .keyword(Token::Into)
        .push(table_token(entity))
        .space()
        .lparen()
        .append(&column_list(members, None))
        .rparen()
        .space();
    ts
}

/// `VALUES (<placeholders>)`
fn values_clause(assignments: &[Assignment]) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.keyword(Token::Values)
        .lparen()
        .append(&placeholder_list(assignments))
        .rparen();
    ts
}

fn statement(ts: TokenStream, params: ParameterSet, what: &str) -> Statement {
    let sql = ts.serialize();
    tracing::debug!(sql = %sql, params = params.len(), "assembled {what}");
    Statement::new(sql, params)
}

/// Members the TVP is matched on: those the predicate template reads.
fn match_members(
    entity: &'static EntityDescriptor,
    template: &Expr,
) -> QueryResult<Vec<&'static MemberDescriptor>> {
    let mut scratch = ParameterSet::new();
    let compiled = compile_predicate(template, &Scope::single(entity), &mut scratch)?;
    if compiled.members.is_empty() {
        return Err(QueryError::unsupported(
            "bulk match template reads no members",
        ));
    }
    Ok(compiled.members.iter().map(|m| m.member).collect())
}

/// `a.[x] = src.[x] AND a.[y] = src.[y]`
fn match_condition(members: &[&'static MemberDescriptor], alias: &str) -> TokenStream {
    let mut ts = TokenStream::new();
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            ts.space().keyword(Token::And);
        }
        ts.append(&column(member, Some(alias)))
            .space()
            .keyword(Token::Eq)
            .append(&column(member, Some(SOURCE_ALIAS)));
    }
    ts
}

impl SqlGenerator {
    // ------------------------------------------------------------------------
    // INSERT
    // ------------------------------------------------------------------------

    /// `INSERT INTO <table> (<cols>) VALUES (<params>)`; identity members are
    /// left to the database.
    pub fn insert<T: Entity>(&self, item: &T) -> QueryResult<Statement> {
        let mut params = self.new_params();
        let assignments = entity_assignments(item, &mut params)?;
        let mut ts = insert_head(T::descriptor(), assignments.iter().map(|a| a.member));
        ts.append(&values_clause(&assignments));
        Ok(statement(ts, params, "insert"))
    }

    /// Insert returning the written row through `OUTPUT`.
    pub fn insert_output<T: Entity>(&self, item: &T) -> QueryResult<Statement> {
        let mut params = self.new_params();
        let assignments = entity_assignments(item, &mut params)?;
        let mut ts = insert_head(T::descriptor(), assignments.iter().map(|a| a.member));
        ts.keyword(Token::Output)
            .append(&output_list(T::descriptor()))
            .space()
            .append(&values_clause(&assignments));
        Ok(statement(ts, params, "insert with output"))
    }

    /// One statement per item from the same template, for execution inside
    /// one transaction.
    pub fn insert_many<T: Entity>(&self, items: &[T]) -> QueryResult<Vec<Statement>> {
        items.iter().map(|item| self.insert(item)).collect()
    }

    /// Insert unless a row matching `absent_when` exists:
    /// `INSERT INTO t (cols) SELECT <params> WHERE NOT EXISTS (SELECT 1 FROM t WHERE ...)`.
    pub fn insert_if_absent<T: Entity>(&self, item: &T, absent_when: &Expr) -> QueryResult<Statement> {
        let entity = T::descriptor();
        let mut params = self.new_params();
        let assignments = entity_assignments(item, &mut params)?;
        let predicate = compile_predicate(absent_when, &Scope::single(entity), &mut params)?;

        let mut ts = insert_head(entity, assignments.iter().map(|a| a.member));
        ts.keyword(Token::Select)
            .append(&placeholder_list(&assignments))
            .space()
            .keyword(Token::Where)
            .keyword(Token::Not)
            .keyword(Token::Exists)
            .lparen()
            .keyword(Token::Select)
            .push(Token::LitInt(1))
            .space()
            .keyword(Token::From)
            .push(table_token(entity));
        if self.dirty_read() {
            ts.space().push(Token::NoLock);
        }
        ts.space()
            .keyword(Token::Where)
            .append(&predicate.sql)
            .rparen();
        Ok(statement(ts, params, "insert if absent"))
    }

    /// Insert from a member-initializer template. Every required member of the
    /// entity must be assigned.
    pub fn insert_template(
        &self,
        entity: &'static EntityDescriptor,
        template: &Row,
    ) -> QueryResult<Statement> {
        let missing: Vec<String> = cache::required_members(entity)
            .iter()
            .filter(|m| template.value(m.name).is_none())
            .map(|m| m.name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(QueryError::MissingRequiredColumns {
                entity: entity.type_name.to_string(),
                columns: missing,
            });
        }

        let mut params = self.new_params();
        let assignments = named_assignments(entity, template, &mut params)?;
        let mut ts = insert_head(entity, assignments.iter().map(|a| a.member));
        ts.append(&values_clause(&assignments));
        Ok(statement(ts, params, "templated insert"))
    }

    /// `INSERT INTO t (cols) SELECT cols FROM @tvp`
    pub fn bulk_insert<T: Entity>(&self, items: &[T]) -> QueryResult<Statement> {
        let entity = T::descriptor();
        let members: Vec<_> = entity.insertable_members().collect();
        let tvp = TableParameter::from_entities(entity, &members, items)?;

        let mut ts = insert_head(entity, members.iter().copied());
        ts.keyword(Token::Select)
            .append(&column_list(members.iter().copied(), None))
            .space()
            .keyword(Token::From)
            .push(tvp.token());

        let mut stmt = statement(ts, ParameterSet::new(), "bulk insert");
        stmt.table_parameter = Some(tvp);
        Ok(stmt)
    }

    // ------------------------------------------------------------------------
    // UPDATE / UPSERT
    // ------------------------------------------------------------------------

    fn update_tokens(
        entity: &'static EntityDescriptor,
        assignments: &[Assignment],
        predicate: &TokenStream,
    ) -> TokenStream {
        let sets: Vec<TokenStream> = assignments
            .iter()
            .map(|a| {
                let mut ts = column(a.member, None);
                ts.space().keyword(Token::Eq).push(a.placeholder.clone());
                ts
            })
            .collect();
        let mut ts = TokenStream::new();
        ts.keyword(Token::Update)
            .push(table_token(entity))
            .space()
            .keyword(Token::Set)
            .append_list(&sets)
            .space()
            .keyword(Token::Where)
            .append(predicate);
        ts
    }

    /// `UPDATE <table> SET <col> = @p, ... WHERE <predicate>`
    pub fn update(
        &self,
        entity: &'static EntityDescriptor,
        values: &Row,
        predicate: &Expr,
    ) -> QueryResult<Statement> {
        let mut params = self.new_params();
        let assignments = named_assignments(entity, values, &mut params)?;
        let compiled = compile_predicate(predicate, &Scope::single(entity), &mut params)?;
        let ts = Self::update_tokens(entity, &assignments, &compiled.sql);
        Ok(statement(ts, params, "update"))
    }

    /// UPDATE, then `IF @@ROWCOUNT = 0 INSERT` with the same assignments.
    pub fn upsert(
        &self,
        entity: &'static EntityDescriptor,
        values: &Row,
        predicate: &Expr,
    ) -> QueryResult<Statement> {
        let mut params = self.new_params();
        let assignments = named_assignments(entity, values, &mut params)?;
        let compiled = compile_predicate(predicate, &Scope::single(entity), &mut params)?;

        let mut ts = Self::update_tokens(entity, &assignments, &compiled.sql);
        ts.push(Token::Semicolon)
            .space()
            .keyword(Token::If)
            .push(Token::RowCount)
            .space()
            .keyword(Token::Eq)
            .push(Token::LitInt(0))
            .space()
            .append(&insert_head(entity, assignments.iter().map(|a| a.member)))
            .append(&values_clause(&assignments));
        Ok(statement(ts, params, "upsert"))
    }

    fn bulk_update_tokens(
        entity: &'static EntityDescriptor,
        tvp: &TableParameter,
        matched: &[&'static MemberDescriptor],
    ) -> QueryResult<(TokenStream, String)> {
        let alias = alias_for(entity.type_name, 0);
        let sets: Vec<TokenStream> = entity
            .insertable_members()
            .filter(|m| !matched.contains(m))
            .map(|m| {
                let mut ts = column(m, Some(&alias));
                ts.space()
                    .keyword(Token::Eq)
                    .append(&column(m, Some(SOURCE_ALIAS)));
                ts
            })
            .collect();
        if sets.is_empty() {
            return Err(QueryError::unsupported(format!(
                "`{}` has no columns to update outside the match template",
                entity.type_name
            )));
        }

        let mut ts = TokenStream::new();
        ts.keyword(Token::Update)
            .push(Token::Alias(alias.clone()))
            .space()
            .keyword(Token::Set)
            .append_list(&sets)
            .space()
            .keyword(Token::From)
            .push(table_token(entity))
            .space()
            .push(Token::Alias(alias.clone()))
            .space()
            .keyword(Token::Inner)
            .keyword(Token::Join)
            .push(tvp.token())
            .space()
            .push(Token::Alias(SOURCE_ALIAS.to_string()))
            .space()
            .keyword(Token::On)
            .append(&match_condition(matched, &alias));
        Ok((ts, alias))
    }

    /// Update every row of the table-valued parameter, matched on the members
    /// `match_on` reads.
    pub fn bulk_update<T: Entity>(&self, items: &[T], match_on: &Expr) -> QueryResult<Statement> {
        let entity = T::descriptor();
        let matched = match_members(entity, match_on)?;
        let members: Vec<_> = entity.mapped_members().collect();
        let tvp = TableParameter::from_entities(entity, &members, items)?;

        let (ts, _) = Self::bulk_update_tokens(entity, &tvp, &matched)?;
        let mut stmt = statement(ts, ParameterSet::new(), "bulk update");
        stmt.table_parameter = Some(tvp);
        Ok(stmt)
    }

    /// Bulk update plus `INSERT ... SELECT ... FROM @tvp WHERE NOT EXISTS` for
    /// rows that matched nothing.
    pub fn bulk_upsert<T: Entity>(&self, items: &[T], match_on: &Expr) -> QueryResult<Statement> {
        let entity = T::descriptor();
        let matched = match_members(entity, match_on)?;
        let members: Vec<_> = entity.mapped_members().collect();
        let tvp = TableParameter::from_entities(entity, &members, items)?;

        let (mut ts, alias) = Self::bulk_update_tokens(entity, &tvp, &matched)?;
        let inserted: Vec<_> = entity.insertable_members().collect();
        ts.push(Token::Semicolon)
            .space()
            .append(&insert_head(entity, inserted.iter().copied()))
            .keyword(Token::Select)
            .append(&column_list(inserted.iter().copied(), Some(SOURCE_ALIAS)))
            .space()
            .keyword(Token::From)
            .push(tvp.token())
            .space()
            .push(Token::Alias(SOURCE_ALIAS.to_string()))
            .space()
            .keyword(Token::Where)
            .keyword(Token::Not)
            .keyword(Token::Exists)
            .lparen()
            .keyword(Token::Select)
            .push(Token::LitInt(1))
            .space()
            .keyword(Token::From)
            .push(table_token(entity))
            .space()
            .push(Token::Alias(alias.clone()));
        if self.dirty_read() {
            ts.space().push(Token::NoLock);
        }
        ts.space()
            .keyword(Token::Where)
            .append(&match_condition(&matched, &alias))
            .rparen();

        let mut stmt = statement(ts, ParameterSet::new(), "bulk upsert");
        stmt.table_parameter = Some(tvp);
        Ok(stmt)
    }

    // ------------------------------------------------------------------------
    // DELETE
    // ------------------------------------------------------------------------

    /// `DELETE FROM <table> WHERE <predicate>`
    pub fn delete(&self, entity: &'static EntityDescriptor, predicate: &Expr) -> QueryResult<Statement> {
        let mut params = self.new_params();
        let compiled = compile_predicate(predicate, &Scope::single(entity), &mut params)?;
        let mut ts = TokenStream::new();
        ts.keyword(Token::Delete)
            .keyword(Token::From)
            .push(table_token(entity))
            .space()
            .keyword(Token::Where)
            .append(&compiled.sql);
        Ok(statement(ts, params, "delete"))
    }

    /// `DELETE <alias> FROM <table> <alias> <joins> WHERE <predicate>`; the
    /// predicate may read any joined position.
    pub fn delete_joined(
        &self,
        entity: &'static EntityDescriptor,
        joins: &[JoinDescriptor],
        predicate: &Expr,
    ) -> QueryResult<Statement> {
        if joins.is_empty() {
            return self.delete(entity, predicate);
        }
        let entities: Vec<_> = std::iter::once(entity)
            .chain(joins.iter().map(|j| j.entity))
            .collect();
        let aliases = aliases_for(&entities);
        let root_alias = aliases[0].clone();
        let scope = Scope::new(entities).with_aliases(aliases);
        let mut params = self.new_params();

        let mut ts = TokenStream::new();
        ts.keyword(Token::Delete)
            .push(Token::Alias(root_alias.clone()))
            .space()
            .keyword(Token::From)
            .push(table_token(entity))
            .space()
            .push(Token::Alias(root_alias))
            .append(&join_clauses(
                entity,
                joins,
                &scope,
                self.registry(),
                self.dirty_read(),
                &mut params,
            )?);
        let compiled = compile_predicate(predicate, &scope, &mut params)?;
        ts.space().keyword(Token::Where).append(&compiled.sql);
        Ok(statement(ts, params, "delete"))
    }
}
