//! Column accessors
//!
//! Turns a request key into the warehouse expression that reads it. The
//! billing date columns are derived from the billed-at string, map sub-keys
//! become subscripts, and keys under an unwound array read the exploded
//! element instead.

use super::ast::{Explode, Ident, SqlExpr, SqlType};
use crate::config::WarehouseConfig;
use crate::emitter::EmitError;
use crate::plan::ColumnPath;
use crate::query::DatePrecision;

/// Name of the exploded element column
pub const UNWOUND_ALIAS: &str = "_unwound";
const UNWIND_VIEW: &str = "_unwind";

pub struct Accessors<'a> {
    config: &'a WarehouseConfig,
    unwind: Option<&'a ColumnPath>,
}

impl<'a> Accessors<'a> {
    pub fn new(config: &'a WarehouseConfig, unwind: Option<&'a ColumnPath>) -> Self {
        Self { config, unwind }
    }

    pub fn config(&self) -> &WarehouseConfig {
        self.config
    }

    /// Typed read of a column as used in keys and aggregates
    pub fn column(&self, path: &ColumnPath) -> Result<SqlExpr, EmitError> {
        self.read(path, true)
    }

    /// Typed read for predicates. Missing numeric map values stay NULL so
    /// null tests and comparisons see the stored value.
    pub fn predicate_column(&self, path: &ColumnPath) -> Result<SqlExpr, EmitError> {
        self.read(path, false)
    }

    fn read(&self, path: &ColumnPath, coalesce: bool) -> Result<SqlExpr, EmitError> {
        if let Some(unwind) = self.unwind {
            if path.starts_with(unwind) {
                return self.unwound(path, unwind, coalesce);
            }
        }
        if path.sub.is_none() {
            if let Some(precision) = date_precision(&path.root) {
                return self.date_bucket(precision);
            }
        }
        self.stored(path, coalesce)
    }

    /// Billing date cut to a precision
    pub fn date_bucket(&self, precision: DatePrecision) -> Result<SqlExpr, EmitError> {
        Ok(SqlExpr::call(
            "SUBSTRING",
            vec![
                SqlExpr::column(&self.config.billed_at_column)?,
                SqlExpr::int(1),
                SqlExpr::int(precision.width() as i64),
            ],
        ))
    }

    pub fn partition(&self) -> Result<SqlExpr, EmitError> {
        SqlExpr::column(&self.config.partition_column)
    }

    /// The lateral view for the unwound path, if any
    pub fn explode(&self) -> Result<Option<Explode>, EmitError> {
        let Some(unwind) = self.unwind else {
            return Ok(None);
        };
        Ok(Some(Explode {
            source: raw(unwind)?,
            view: Ident::new(UNWIND_VIEW)?,
            alias: Ident::new(UNWOUND_ALIAS)?,
        }))
    }

    fn stored(&self, path: &ColumnPath, coalesce: bool) -> Result<SqlExpr, EmitError> {
        match &path.sub {
            None => SqlExpr::column(&path.root),
            Some(_) => Ok(self.typed(&path.root, raw(path)?, coalesce)),
        }
    }

    fn unwound(
        &self,
        path: &ColumnPath,
        unwind: &ColumnPath,
        coalesce: bool,
    ) -> Result<SqlExpr, EmitError> {
        let element = SqlExpr::column(UNWOUND_ALIAS)?;
        let full = path.key();
        let rest = full
            .get(unwind.key().len() + 1..)
            .filter(|r| !r.is_empty());
        match rest {
            None => Ok(element),
            Some(rest) => {
                let sub = SqlExpr::Subscript {
                    base: Box::new(element),
                    key: rest.to_string(),
                };
                Ok(self.typed(&path.root, sub, coalesce))
            }
        }
    }

    /// Cast a map value: numeric prefixes become decimals, defaulting to 0
    /// when `coalesce` is set
    fn typed(&self, root: &str, expr: SqlExpr, coalesce: bool) -> SqlExpr {
        if !self.config.is_numeric_prefix(root) {
            return SqlExpr::cast(expr, SqlType::String);
        }
        let decimal = SqlExpr::cast(
            expr,
            SqlType::Decimal(self.config.decimal_precision, self.config.decimal_scale),
        );
        if coalesce {
            SqlExpr::call("COALESCE", vec![decimal, SqlExpr::int(0)])
        } else {
            decimal
        }
    }
}

/// Untyped read, as the explode source
fn raw(path: &ColumnPath) -> Result<SqlExpr, EmitError> {
    let root = SqlExpr::column(&path.root)?;
    Ok(match &path.sub {
        None => root,
        Some(sub) => SqlExpr::Subscript {
            base: Box::new(root),
            key: sub.clone(),
        },
    })
}

/// The billing date columns derived from the billed-at string
pub fn date_precision(column: &str) -> Option<DatePrecision> {
    [DatePrecision::Year, DatePrecision::Month, DatePrecision::Day]
        .into_iter()
        .find(|p| p.column() == column)
}
