//! T-SQL generation.
//!
//! - [`expr`] - expression AST and builder DSL
//! - [`params`] - parameter store
//! - [`scope`] - positional binding of expression parameters to tables
//! - [`predicate`] - boolean expression → search condition
//! - [`selector`] - select, output and grouping column lists
//! - [`join`] - aliases, topology checks and JOIN clauses
//! - [`query`] - SELECT assembly
//! - [`dml`] - INSERT, UPDATE, UPSERT and DELETE assembly, bulk paths included
//! - [`token`] - token stream serialized to SQL text

pub mod dml;
pub mod expr;
pub mod join;
pub mod params;
pub mod predicate;
pub mod query;
pub mod scope;
pub mod selector;
pub mod token;

pub use dml::TableParameter;
pub use expr::{
    avg, count, field, list, max, member, min, null, output, sum, val, AggregateFunc, CompareOp,
    Expr, ExprExt, MemberRef, Method,
};
pub use join::{alias_for, Cardinality, JoinDescriptor, JoinKind, MAX_JOINED_TABLES};
pub use params::{DbString, Parameter, ParameterSet};
pub use predicate::{compile_predicate, CompiledPredicate};
pub use query::{OrderBy, QueryShape, SortDir, SqlGenerator, Statement};
pub use scope::{ResolvedMember, Scope};
pub use selector::{GroupProjection, Selector, SplitPlan, SplitPoint};
pub use token::{Token, TokenStream};
