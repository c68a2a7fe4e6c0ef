//! Expression AST - the typed shape of predicates, selectors and groupings.
//!
//! Expressions are built with free functions and the [`ExprExt`] combinators:
//!
//! ```ignore
//! use quarry::sql::expr::{field, list, member, ExprExt};
//!
//! // x => x.Id > 1 && x.Id < 100
//! let range = field("Id").gt(1).and(field("Id").lt(100));
//!
//! // x => new[] { 17, 25 }.Contains(x.Id)
//! let any_of = list([17, 25]).contains(field("Id"));
//!
//! // (c, m) => c.Id == m.ClubId
//! let on = member(0, "Id").eq(member(1, "ClubId"));
//! ```
//!
//! Positions are zero-based: position 0 is the root type of the statement,
//! position `n` the `n`-th joined type.

use uuid::Uuid;

use super::token::Token;
use crate::mapping::Value;

// =============================================================================
// Expression AST
// =============================================================================

/// Access to a member of the entity bound at `position`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub position: usize,
    pub name: String,
}

/// An expression over up to seven positional parameters.
///
/// Every variant must be handled by each compiler - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `x.Member`
    Member(MemberRef),

    /// Constant or captured value.
    Value(Value),

    /// Literal or captured array.
    List(Vec<Value>),

    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),

    /// Binary comparison: left op right
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },

    /// Method call: `target.method(arg)`
    Call {
        target: Box<Expr>,
        method: Method,
        arg: Box<Expr>,
    },

    /// Aggregate call inside a grouping projection. `Count` takes no argument.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
    },

    /// Implicit type conversion wrapped around another expression.
    Convert(Box<Expr>),

    /// Reference to a projection output column by name.
    Output(String),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CompareOp {
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Gte,
            CompareOp::Gte => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Lte,
            CompareOp::Lte => CompareOp::Gt,
        }
    }

    pub fn to_token(self) -> Token {
        match self {
            CompareOp::Eq => Token::Eq,
            CompareOp::Ne => Token::Ne,
            CompareOp::Lt => Token::Lt,
            CompareOp::Gt => Token::Gt,
            CompareOp::Lte => Token::Lte,
            CompareOp::Gte => Token::Gte,
        }
    }
}

/// Methods the predicate grammar understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Equals,
    /// String containment, or list membership when the target is a list.
    Contains,
    StartsWith,
    EndsWith,
}

/// Aggregates allowed in a grouping projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Max,
    Min,
    Sum,
    Avg,
}

impl AggregateFunc {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Value(v)
    }
}

impl From<MemberRef> for Expr {
    fn from(m: MemberRef) -> Self {
        Expr::Member(m)
    }
}

macro_rules! expr_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Value(v.into())
                }
            }
        )*
    };
}

expr_from_value!(bool, i32, i64, f64, &str, String, Vec<u8>, Uuid);

// =============================================================================
// Constructors
// =============================================================================

/// Member of the entity at `position`.
pub fn member(position: usize, name: &str) -> Expr {
    Expr::Member(MemberRef {
        position,
        name: name.to_string(),
    })
}

/// Member of the root entity (position 0).
pub fn field(name: &str) -> Expr {
    member(0, name)
}

/// Constant value.
pub fn val(v: impl Into<Value>) -> Expr {
    Expr::Value(v.into())
}

/// The NULL constant.
pub fn null() -> Expr {
    Expr::Value(Value::Null)
}

/// Literal array.
pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Expr {
    Expr::List(values.into_iter().map(Into::into).collect())
}

/// `Count()`
pub fn count() -> Expr {
    Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: None,
    }
}

fn aggregate(func: AggregateFunc, arg: Expr) -> Expr {
    Expr::Aggregate {
        func,
        arg: Some(Box::new(arg)),
    }
}

pub fn max(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Max, arg)
}

pub fn min(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Min, arg)
}

pub fn sum(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Sum, arg)
}

pub fn avg(arg: Expr) -> Expr {
    aggregate(AggregateFunc::Avg, arg)
}

/// Projection output column, for ordering grouped queries.
pub fn output(name: &str) -> Expr {
    Expr::Output(name.to_string())
}

// =============================================================================
// Combinators
// =============================================================================

/// Fluent combinators for building predicates.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn compare(self, op: CompareOp, right: impl Into<Expr>) -> Expr {
        Expr::Compare {
            left: Box::new(self.into_expr()),
            op,
            right: Box::new(right.into()),
        }
    }

    fn eq(self, right: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Eq, right)
    }

    fn ne(self, right: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Ne, right)
    }

    fn lt(self, right: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Lt, right)
    }

    fn gt(self, right: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Gt, right)
    }

    fn lte(self, right: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Lte, right)
    }

    fn gte(self, right: impl Into<Expr>) -> Expr {
        self.compare(CompareOp::Gte, right)
    }

    fn and(self, right: impl Into<Expr>) -> Expr {
        Expr::And(Box::new(self.into_expr()), Box::new(right.into()))
    }

    fn or(self, right: impl Into<Expr>) -> Expr {
        Expr::Or(Box::new(self.into_expr()), Box::new(right.into()))
    }

    fn not(self) -> Expr {
        Expr::Not(Box::new(self.into_expr()))
    }

    fn call(self, method: Method, arg: impl Into<Expr>) -> Expr {
        Expr::Call {
            target: Box::new(self.into_expr()),
            method,
            arg: Box::new(arg.into()),
        }
    }

    fn equals(self, arg: impl Into<Expr>) -> Expr {
        self.call(Method::Equals, arg)
    }

    fn contains(self, arg: impl Into<Expr>) -> Expr {
        self.call(Method::Contains, arg)
    }

    fn starts_with(self, arg: impl Into<Expr>) -> Expr {
        self.call(Method::StartsWith, arg)
    }

    fn ends_with(self, arg: impl Into<Expr>) -> Expr {
        self.call(Method::EndsWith, arg)
    }

    fn convert(self) -> Expr {
        Expr::Convert(Box::new(self.into_expr()))
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl Expr {
    pub fn as_member(&self) -> Option<&MemberRef> {
        match self {
            Expr::Member(m) => Some(m),
            _ => None,
        }
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Expr::Member(m) => format!("member `{}` at position {}", m.name, m.position),
            Expr::Value(v) => format!("value {v:?}"),
            Expr::List(_) => "list".into(),
            Expr::And(..) => "AND".into(),
            Expr::Or(..) => "OR".into(),
            Expr::Not(inner) => format!("NOT {}", inner.describe()),
            Expr::Compare { op, .. } => format!("comparison {op:?}"),
            Expr::Call { method, .. } => format!("call {method:?}"),
            Expr::Aggregate { func, .. } => format!("aggregate {}", func.name()),
            Expr::Convert(inner) => format!("conversion of {}", inner.describe()),
            Expr::Output(name) => format!("output `{name}`"),
        }
    }
}
