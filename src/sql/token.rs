//! SQL Tokens - the atomic units of T-SQL output.
//!
//! Every statement the assembler produces is built as a [`TokenStream`] and
//! serialized once at the end, so quoting and placeholder conventions live
//! in exactly one place.

/// SQL Token - every element the assembler emits.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    As,
    On,
    Join,
    Inner,
    Left,
    GroupBy,
    OrderBy,
    Asc,
    Desc,
    Offset,
    Fetch,
    Next,
    Rows,
    Only,
    Top,
    Like,
    NotLike,
    /// `ESCAPE '\'` after a LIKE pattern.
    LikeEscape,
    IsNull,
    IsNotNull,
    Distinct,
    Null,
    Cast,
    Not,
    Exists,
    If,

    // === DML Keywords ===
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Output,
    Inserted,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,
    Semicolon,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,

    // === Whitespace ===
    Space,

    // === Hints ===
    /// `WITH (NOLOCK)` table hint for dirty reads.
    NoLock,
    /// `@@ROWCOUNT`
    RowCount,

    // === Dynamic Content ===
    /// Bracket-quoted identifier (table, column, output name).
    Ident(String),
    /// Optionally database- and schema-qualified table name.
    QualifiedIdent {
        database: Option<String>,
        schema: Option<String>,
        name: String,
    },
    /// Generated table alias. Aliases are produced by the alias manager and
    /// never contain characters that need quoting.
    Alias(String),
    /// Named parameter: `@name`.
    Param(String),
    /// Inline (literal-replaced) parameter: `{=name}`.
    InlineParam(String),
    /// Integer literal
    LitInt(i64),
    /// Aggregate or scalar function name.
    FunctionName(String),
    /// SQL type name inside CAST.
    TypeName(String),
}

impl Token {
    /// Serialize this token to T-SQL text.
    pub fn serialize(&self) -> String {
        match self {
            // Keywords
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Inner => "INNER".into(),
            Token::Left => "LEFT".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::Offset => "OFFSET".into(),
            Token::Fetch => "FETCH".into(),
            Token::Next => "NEXT".into(),
            Token::Rows => "ROWS".into(),
            Token::Only => "ONLY".into(),
            Token::Top => "TOP".into(),
            Token::Like => "LIKE".into(),
            Token::NotLike => "NOT LIKE".into(),
            Token::LikeEscape => format!("ESCAPE '{LIKE_ESCAPE}'"),
            Token::IsNull => "IS NULL".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::Null => "NULL".into(),
            Token::Cast => "CAST".into(),
            Token::Not => "NOT".into(),
            Token::Exists => "EXISTS".into(),
            Token::If => "IF".into(),

            // DML keywords
            Token::Insert => "INSERT".into(),
            Token::Into => "INTO".into(),
            Token::Values => "VALUES".into(),
            Token::Update => "UPDATE".into(),
            Token::Set => "SET".into(),
            Token::Delete => "DELETE".into(),
            Token::Output => "OUTPUT".into(),
            Token::Inserted => "INSERTED".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Semicolon => ";".into(),

            // Operators
            Token::Eq => "=".into(),
            Token::Ne => "<>".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),

            Token::Space => " ".into(),

            Token::NoLock => "WITH (NOLOCK)".into(),
            Token::RowCount => "@@ROWCOUNT".into(),

            Token::Ident(name) => quote_bracket(name),
            Token::QualifiedIdent {
                database,
                schema,
                name,
            } => match (database, schema) {
                (Some(db), schema) => format!(
                    "{}.{}.{}",
                    quote_bracket(db),
                    quote_bracket(schema.as_deref().unwrap_or("dbo")),
                    quote_bracket(name)
                ),
                (None, Some(s)) => format!("{}.{}", quote_bracket(s), quote_bracket(name)),
                (None, None) => quote_bracket(name),
            },
            Token::Alias(alias) => alias.clone(),
            Token::Param(name) => format!("@{name}"),
            Token::InlineParam(name) => format!("{{={name}}}"),
            Token::LitInt(n) => n.to_string(),
            Token::FunctionName(name) => name.to_uppercase(),
            Token::TypeName(name) => name.to_uppercase(),
        }
    }
}

/// Escape character for LIKE patterns built from user text.
pub const LIKE_ESCAPE: char = '\\';

/// Quote identifier with square brackets.
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Extend with multiple tokens.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Append each stream, separated by `, `.
    pub fn append_list<'a>(&mut self, items: impl IntoIterator<Item = &'a TokenStream>) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.comma().space();
            }
            self.append(item);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self) -> String {
        self.tokens.iter().map(Token::serialize).collect()
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
    /// Push `token` followed by a space.
    pub fn keyword(&mut self, token: Token) -> &mut Self {
        self.push(token).space()
    }
}

impl From<Token> for TokenStream {
    fn from(token: Token) -> Self {
        Self {
            tokens: vec![token],
        }
    }
}
