//! Minimal SQL expression tree
//!
//! Identifiers are validated when built and always backtick-quoted. Literal
//! text only reaches the output through [`quote_literal`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::emitter::EmitError;
use crate::query::Literal;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"));

/// Quote a string literal: single quotes are doubled, backslashes escaped
pub fn quote_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn pad(indent: usize) -> String {
    "  ".repeat(indent)
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Result<Self, EmitError> {
        if IDENTIFIER.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(EmitError::InvalidIdentifier(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.0)
    }
}

/// `schema.table` or `table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(Vec<Ident>);

impl TableName {
    pub fn parse(name: &str) -> Result<Self, EmitError> {
        let parts = name
            .split('.')
            .map(Ident::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(parts))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join(&self.0, "."))
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Decimal(u8, u8),
    String,
    Timestamp,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Decimal(p, s) => write!(f, "DECIMAL({}, {})", p, s),
            SqlType::String => f.write_str("STRING"),
            SqlType::Timestamp => f.write_str("TIMESTAMP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column(Ident),
    Literal(Literal),
    /// Fixed SQL text such as `*` or `CURRENT_TIMESTAMP()`; never user input
    Keyword(&'static str),
    /// `base['key']`
    Subscript { base: Box<SqlExpr>, key: String },
    Call { func: &'static str, args: Vec<SqlExpr> },
    Cast { expr: Box<SqlExpr>, ty: SqlType },
    Binary { left: Box<SqlExpr>, op: BinaryOp, right: Box<SqlExpr> },
    IsNull { expr: Box<SqlExpr>, negated: bool },
    InList { expr: Box<SqlExpr>, list: Vec<SqlExpr>, negated: bool },
    /// Case-insensitive LIKE
    ILike { expr: Box<SqlExpr>, pattern: String, negated: bool },
    RLike { expr: Box<SqlExpr>, pattern: String },
    And(Vec<SqlExpr>),
    Or(Vec<SqlExpr>),
    Case { when_then: Vec<(SqlExpr, SqlExpr)>, otherwise: Box<SqlExpr> },
    /// `func OVER (PARTITION BY ...)`
    Window { func: Box<SqlExpr>, partition_by: Vec<Ident> },
    Interval { amount: u64, unit: &'static str },
    NamedStruct(Vec<(String, SqlExpr)>),
}

impl SqlExpr {
    pub fn column(name: &str) -> Result<Self, EmitError> {
        Ok(SqlExpr::Column(Ident::new(name)?))
    }

    pub fn string(text: impl Into<String>) -> Self {
        SqlExpr::Literal(Literal::String(text.into()))
    }

    pub fn int(value: i64) -> Self {
        SqlExpr::Literal(Literal::Int(value))
    }

    pub fn call(func: &'static str, args: Vec<SqlExpr>) -> Self {
        SqlExpr::Call { func, args }
    }

    pub fn cast(expr: SqlExpr, ty: SqlType) -> Self {
        SqlExpr::Cast {
            expr: Box::new(expr),
            ty,
        }
    }

    pub fn binary(left: SqlExpr, op: BinaryOp, right: SqlExpr) -> Self {
        SqlExpr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn is_null(expr: SqlExpr, negated: bool) -> Self {
        SqlExpr::IsNull {
            expr: Box::new(expr),
            negated,
        }
    }

    pub fn window(func: SqlExpr, partition_by: Vec<Ident>) -> Self {
        SqlExpr::Window {
            func: Box::new(func),
            partition_by,
        }
    }

    /// AND of the parts, `None` when there are none
    pub fn all(mut parts: Vec<SqlExpr>) -> Option<SqlExpr> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(SqlExpr::And(parts)),
        }
    }
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Literal::Int(i) => i.to_string(),
        Literal::Float(v) => format!("{}", v),
        Literal::String(s) => quote_literal(s),
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlExpr::Column(ident) => write!(f, "{}", ident),
            SqlExpr::Literal(lit) => f.write_str(&render_literal(lit)),
            SqlExpr::Keyword(text) => f.write_str(text),
            SqlExpr::Subscript { base, key } => write!(f, "{}[{}]", base, quote_literal(key)),
            SqlExpr::Call { func, args } => write!(f, "{}({})", func, join(args, ", ")),
            SqlExpr::Cast { expr, ty } => write!(f, "CAST({} AS {})", expr, ty),
            SqlExpr::Binary { left, op, right } => {
                if op.is_arithmetic() {
                    write!(f, "({} {} {})", left, op.as_str(), right)
                } else {
                    write!(f, "{} {} {}", left, op.as_str(), right)
                }
            }
            SqlExpr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            SqlExpr::InList { expr, list, negated } => write!(
                f,
                "{} {}IN ({})",
                expr,
                if *negated { "NOT " } else { "" },
                join(list, ", ")
            ),
            SqlExpr::ILike { expr, pattern, negated } => write!(
                f,
                "{} {}ILIKE {}",
                expr,
                if *negated { "NOT " } else { "" },
                quote_literal(pattern)
            ),
            SqlExpr::RLike { expr, pattern } => write!(f, "{} RLIKE {}", expr, quote_literal(pattern)),
            SqlExpr::And(parts) => match parts.len() {
                0 => f.write_str("TRUE"),
                1 => write!(f, "{}", parts[0]),
                _ => write!(f, "({})", join(parts, " AND ")),
            },
            SqlExpr::Or(parts) => match parts.len() {
                0 => f.write_str("FALSE"),
                1 => write!(f, "{}", parts[0]),
                _ => write!(f, "({})", join(parts, " OR ")),
            },
            SqlExpr::Case { when_then, otherwise } => {
                f.write_str("CASE")?;
                for (when, then) in when_then {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                write!(f, " ELSE {} END", otherwise)
            }
            SqlExpr::Window { func, partition_by } => {
                if partition_by.is_empty() {
                    write!(f, "{} OVER ()", func)
                } else {
                    write!(f, "{} OVER (PARTITION BY {})", func, join(partition_by, ", "))
                }
            }
            SqlExpr::Interval { amount, unit } => write!(f, "INTERVAL {} {}", amount, unit),
            SqlExpr::NamedStruct(fields) => {
                let args: Vec<String> = fields
                    .iter()
                    .map(|(name, expr)| format!("{}, {}", quote_literal(name), expr))
                    .collect();
                write!(f, "NAMED_STRUCT({})", args.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<Ident>,
}

impl SelectItem {
    pub fn aliased(expr: SqlExpr, alias: Ident) -> Self {
        Self {
            expr,
            alias: Some(alias),
        }
    }

    pub fn bare(expr: SqlExpr) -> Self {
        Self { expr, alias: None }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.expr, alias),
            None => write!(f, "{}", self.expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(TableName),
    Cte(Ident),
}

/// `LATERAL VIEW OUTER EXPLODE(source) <view> AS <alias>`
#[derive(Debug, Clone, PartialEq)]
pub struct Explode {
    pub source: SqlExpr,
    pub view: Ident,
    pub alias: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Grouping {
    None,
    All,
    Keys(Vec<Ident>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Source,
    pub explode: Option<Explode>,
    pub selection: Option<SqlExpr>,
    pub group_by: Grouping,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn new(from: Source) -> Self {
        Self {
            distinct: false,
            items: Vec::new(),
            from,
            explode: None,
            selection: None,
            group_by: Grouping::None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn render(&self, indent: usize) -> String {
        let p = pad(indent);
        let mut sql = format!(
            "{p}SELECT {distinct}{items}\n{p}FROM {from}",
            distinct = if self.distinct { "DISTINCT " } else { "" },
            items = join(&self.items, ", "),
            from = match &self.from {
                Source::Table(name) => name.to_string(),
                Source::Cte(name) => name.to_string(),
            },
        );
        if let Some(explode) = &self.explode {
            sql.push_str(&format!(
                "\n{p}LATERAL VIEW OUTER EXPLODE({}) {} AS {}",
                explode.source, explode.view, explode.alias
            ));
        }
        if let Some(selection) = &self.selection {
            sql.push_str(&format!("\n{p}WHERE {}", selection));
        }
        match &self.group_by {
            Grouping::None => {}
            Grouping::All => sql.push_str(&format!("\n{p}GROUP BY ALL")),
            Grouping::Keys(keys) if keys.is_empty() => {}
            Grouping::Keys(keys) => sql.push_str(&format!("\n{p}GROUP BY {}", join(keys, ", "))),
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.expr, if o.desc { "DESC" } else { "ASC" }))
                .collect();
            sql.push_str(&format!("\n{p}ORDER BY {}", keys.join(", ")));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!("\n{p}LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!("\n{p}OFFSET {}", offset));
        }
        sql
    }
}

/// Optional CTEs followed by a body
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub ctes: Vec<(Ident, Select)>,
    pub body: Select,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ctes.is_empty() {
            let ctes: Vec<String> = self
                .ctes
                .iter()
                .map(|(name, select)| format!("{} AS (\n{}\n)", name, select.render(1)))
                .collect();
            writeln!(f, "WITH {}", ctes.join(", "))?;
        }
        f.write_str(&self.body.render(0))
    }
}
