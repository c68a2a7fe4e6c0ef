//! Predicate compiler: boolean [`Expr`] → T-SQL search condition.
//!
//! Values never appear in the SQL text. Each constant becomes a named
//! parameter in the shared [`ParameterSet`], named after the member it is
//! compared against.

use super::expr::{CompareOp, Expr, MemberRef, Method};
use super::params::ParameterSet;
use super::scope::{ResolvedMember, Scope};
use super::token::{Token, TokenStream, LIKE_ESCAPE};
use crate::error::{QueryError, QueryResult};
use crate::mapping::Value;

/// Compiled search condition plus the members it reads.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub sql: TokenStream,
    /// Members in the order they appear, duplicates removed.
    pub members: Vec<ResolvedMember>,
}

impl CompiledPredicate {
    pub fn to_sql(&self) -> String {
        self.sql.serialize()
    }

    /// Names of the involved members, in order of appearance.
    pub fn member_names(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.member.name).collect()
    }
}

/// Where a `%` wildcard goes in a LIKE parameter.
#[derive(Debug, Clone, Copy)]
enum Wildcard {
    Both,
    After,
    Before,
}

impl Wildcard {
    /// Wrap `text` with `%`, matching its own `%`, `_`, `[` and escape
    /// characters literally.
    fn apply(self, text: &str) -> String {
        let text = escape_like(text);
        match self {
            Wildcard::Both => format!("%{text}%"),
            Wildcard::After => format!("{text}%"),
            Wildcard::Before => format!("%{text}"),
        }
    }
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '[') || c == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Stateful compiler for one predicate.
pub struct PredicateCompiler<'a> {
    scope: &'a Scope,
    params: &'a mut ParameterSet,
    members: Vec<ResolvedMember>,
}

impl<'a> PredicateCompiler<'a> {
    /// Compile `expr` against `scope`, adding parameters to `params`.
    pub fn compile(
        expr: &Expr,
        scope: &'a Scope,
        params: &'a mut ParameterSet,
    ) -> QueryResult<CompiledPredicate> {
        let mut compiler = PredicateCompiler {
            scope,
            params,
            members: Vec::new(),
        };
        let sql = compiler.condition(expr, false)?;
        Ok(CompiledPredicate {
            sql,
            members: compiler.members,
        })
    }

    fn condition(&mut self, expr: &Expr, composite: bool) -> QueryResult<TokenStream> {
        match expr {
            Expr::And(l, r) => self.junction(l, Token::And, r),
            Expr::Or(l, r) => self.junction(l, Token::Or, r),
            Expr::Not(inner) => self.negated(inner, composite),
            Expr::Compare { left, op, right } => self.comparison(left, *op, right, composite),
            Expr::Call {
                target,
                method,
                arg,
            } => self.call(target, *method, arg, false, composite),
            Expr::Member(m) => self.bool_member(m, false),
            Expr::Convert(inner) => self.condition(inner, composite),
            other => Err(QueryError::unsupported(format!(
                "{} is not a condition",
                other.describe()
            ))),
        }
    }

    fn junction(&mut self, left: &Expr, op: Token, right: &Expr) -> QueryResult<TokenStream> {
        let l = self.condition(left, true)?;
        let r = self.condition(right, true)?;
        let mut ts = TokenStream::new();
        ts.lparen()
            .append(&l)
            .rparen()
            .space()
            .keyword(op)
            .lparen()
            .append(&r)
            .rparen();
        Ok(ts)
    }

    fn negated(&mut self, inner: &Expr, composite: bool) -> QueryResult<TokenStream> {
        match inner {
            Expr::Not(x) => self.condition(x, composite),
            Expr::Compare { left, op, right } => {
                self.comparison(left, op.negate(), right, composite)
            }
            Expr::Call {
                target,
                method,
                arg,
            } => self.call(target, *method, arg, true, composite),
            Expr::Member(m) => self.bool_member(m, true),
            Expr::Convert(x) => self.negated(x, composite),
            Expr::And(..) | Expr::Or(..) => {
                Err(QueryError::unsupported("NOT over AND/OR"))
            }
            other => Err(QueryError::unsupported(format!(
                "NOT over {}",
                other.describe()
            ))),
        }
    }

    /// Resolve a member and record it as involved.
    fn column(&mut self, member: &MemberRef) -> QueryResult<(TokenStream, ResolvedMember)> {
        let resolved = self.scope.resolve(member)?;
        if !self.members.contains(&resolved) {
            self.members.push(resolved);
        }
        Ok((self.scope.column_tokens(&resolved), resolved))
    }

    fn left_member(expr: &Expr) -> QueryResult<&MemberRef> {
        match expr {
            Expr::Member(m) => Ok(m),
            Expr::Convert(inner) => Self::left_member(inner),
            other => Err(QueryError::unsupported(format!(
                "left side must be a mapped member, found {}",
                other.describe()
            ))),
        }
    }

    fn comparison(
        &mut self,
        left: &Expr,
        op: CompareOp,
        right: &Expr,
        composite: bool,
    ) -> QueryResult<TokenStream> {
        let left = Self::left_member(left)?;
        let (col, resolved) = self.column(left)?;
        let mut ts = col;
        ts.space();

        match Self::strip_convert(right) {
            Expr::Value(Value::Null) => {
                if composite {
                    return Err(QueryError::NullInComposite);
                }
                match op {
                    CompareOp::Eq => ts.push(Token::IsNull),
                    CompareOp::Ne => ts.push(Token::IsNotNull),
                    other => {
                        return Err(QueryError::unsupported(format!(
                            "{other:?} against NULL"
                        )))
                    }
                };
            }
            Expr::Value(value) => {
                let placeholder =
                    self.params
                        .add(resolved.member.name, value.clone(), Some(resolved.member));
                ts.keyword(op.to_token()).push(placeholder);
            }
            Expr::Member(other) => {
                let (rhs, _) = self.column(other)?;
                ts.keyword(op.to_token()).append(&rhs);
            }
            other => {
                return Err(QueryError::unsupported(format!(
                    "right side must be a value or member, found {}",
                    other.describe()
                )))
            }
        }
        Ok(ts)
    }

    fn strip_convert(expr: &Expr) -> &Expr {
        match expr {
            Expr::Convert(inner) => Self::strip_convert(inner),
            other => other,
        }
    }

    fn call(
        &mut self,
        target: &Expr,
        method: Method,
        arg: &Expr,
        negated: bool,
        composite: bool,
    ) -> QueryResult<TokenStream> {
        match (method, Self::strip_convert(target)) {
            (Method::Equals, _) => {
                let op = if negated { CompareOp::Ne } else { CompareOp::Eq };
                self.comparison(target, op, arg, composite)
            }
            (Method::Contains, Expr::List(values)) => self.membership(values, arg, negated),
            (Method::Contains, Expr::Member(m)) => match Self::strip_convert(arg) {
                Expr::Member(_) => Err(QueryError::unsupported(format!(
                    "list source `{}` must be a literal or captured list",
                    m.name
                ))),
                _ => self.like(m, arg, Wildcard::Both, negated),
            },
            (Method::StartsWith, Expr::Member(m)) => self.like(m, arg, Wildcard::After, negated),
            (Method::EndsWith, Expr::Member(m)) => self.like(m, arg, Wildcard::Before, negated),
            (Method::Contains, other) => Err(QueryError::unsupported(format!(
                "list source must be a literal or captured list, found {}",
                other.describe()
            ))),
            (_, other) => Err(QueryError::unsupported(format!(
                "{method:?} on {}",
                other.describe()
            ))),
        }
    }

    fn like(
        &mut self,
        member: &MemberRef,
        arg: &Expr,
        wildcard: Wildcard,
        negated: bool,
    ) -> QueryResult<TokenStream> {
        let text = match Self::strip_convert(arg) {
            Expr::Value(Value::Text(s)) => s,
            other => {
                return Err(QueryError::unsupported(format!(
                    "pattern must be a text value, found {}",
                    other.describe()
                )))
            }
        };
        let (mut ts, resolved) = self.column(member)?;
        let placeholder = self.params.add(
            resolved.member.name,
            Value::Text(wildcard.apply(text)),
            Some(resolved.member),
        );
        ts.space()
            .keyword(if negated { Token::NotLike } else { Token::Like })
            .push(placeholder)
            .space()
            .push(Token::LikeEscape);
        Ok(ts)
    }

    fn membership(
        &mut self,
        values: &[Value],
        arg: &Expr,
        negated: bool,
    ) -> QueryResult<TokenStream> {
        let member = Self::left_member(arg)?;
        let (col, resolved) = self.column(member)?;

        let mut ts = TokenStream::new();
        if values.is_empty() {
            ts.push(Token::LitInt(1))
                .space()
                .keyword(Token::Eq)
                .push(Token::LitInt(if negated { 1 } else { 0 }));
            return Ok(ts);
        }

        let (op, joiner) = if negated {
            (CompareOp::Ne, Token::And)
        } else {
            (CompareOp::Eq, Token::Or)
        };

        ts.lparen();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                ts.space().keyword(joiner.clone());
            }
            ts.append(&col).space();
            if value.is_null() {
                ts.push(if negated { Token::IsNotNull } else { Token::IsNull });
            } else {
                let placeholder =
                    self.params
                        .add(resolved.member.name, value.clone(), Some(resolved.member));
                ts.keyword(op.to_token()).push(placeholder);
            }
        }
        ts.rparen();
        Ok(ts)
    }

    fn bool_member(&mut self, member: &MemberRef, negated: bool) -> QueryResult<TokenStream> {
        let (mut ts, _) = self.column(member)?;
        ts.space()
            .keyword(Token::Eq)
            .push(Token::LitInt(if negated { 0 } else { 1 }));
        Ok(ts)
    }
}

/// Compile a predicate against `scope`.
pub fn compile_predicate(
    expr: &Expr,
    scope: &Scope,
    params: &mut ParameterSet,
) -> QueryResult<CompiledPredicate> {
    PredicateCompiler::compile(expr, scope, params)
}
