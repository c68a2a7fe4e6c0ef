//! Parameter store: named parameters for one statement.
//!
//! Names derive from the column they bind to and stay unique within a
//! statement by appending an incrementing suffix (`Id`, `Id1`, `Id2`, ...),
//! so a range predicate or a list expansion on one column never collides.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use super::token::Token;
use crate::mapping::{MemberDescriptor, Value};

static INLINE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{=([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// Typed string wrapping for columns declared with a non-default type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DbString {
    /// `varchar`/`char` rather than `nvarchar`/`nchar`.
    pub ansi: bool,
    pub fixed_length: bool,
    /// `None` means unbounded (`MAX`).
    pub length: Option<u32>,
}

impl DbString {
    /// Wrapping for a member, or `None` when the default (`nvarchar`) applies.
    pub fn for_member(member: &MemberDescriptor) -> Option<Self> {
        let type_name = member.type_name?.to_ascii_lowercase();
        let (ansi, fixed_length) = match type_name.as_str() {
            "varchar" => (true, false),
            "char" => (true, true),
            "nchar" => (false, true),
            _ => return None,
        };
        Some(Self {
            ansi,
            fixed_length,
            length: member.length,
        })
    }

    /// T-SQL type name, e.g. `varchar(64)` or `varchar(max)`.
    pub fn sql_type(&self) -> String {
        let base = match (self.ansi, self.fixed_length) {
            (true, false) => "varchar",
            (true, true) => "char",
            (false, true) => "nchar",
            (false, false) => "nvarchar",
        };
        match self.length {
            Some(n) => format!("{base}({n})"),
            None => format!("{base}(max)"),
        }
    }
}

/// One named parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub db_string: Option<DbString>,
    /// Rendered as `{=name}` and replaced by its literal before execution.
    pub inline: bool,
}

/// Ordered name → parameter map for one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSet {
    params: Vec<Parameter>,
    #[serde(skip)]
    inline_numeric: bool,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set that renders numeric values as inline placeholders.
    pub fn with_inline_numeric(inline_numeric: bool) -> Self {
        Self {
            params: Vec::new(),
            inline_numeric,
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|p| &p.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    fn unique_name(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{base}{suffix}");
            if !self.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Add a parameter named after `base` and return its placeholder token.
    pub fn add(&mut self, base: &str, value: Value, member: Option<&MemberDescriptor>) -> Token {
        let name = self.unique_name(base);
        let db_string = match (&value, member) {
            (Value::Text(_), Some(member)) => DbString::for_member(member),
            _ => None,
        };
        let inline = self.inline_numeric && value.is_numeric();
        let token = if inline {
            Token::InlineParam(name.clone())
        } else {
            Token::Param(name.clone())
        };
        self.params.push(Parameter {
            name,
            value,
            db_string,
            inline,
        });
        token
    }

    /// Replace `{=name}` placeholders with their literal values.
    ///
    /// For executors that do not implement the inline convention themselves.
    /// Unknown names are left untouched.
    pub fn expand_inline(&self, sql: &str) -> String {
        INLINE_PLACEHOLDER
            .replace_all(sql, |caps: &Captures| match self.value(&caps[1]) {
                Some(value) => value.to_literal(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
