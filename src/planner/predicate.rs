//! Condition → predicate lowering
//!
//! All null handling and empty-list short-circuits live here, so the two
//! emitters only ever see well-formed predicates.

use tracing::warn;

use crate::plan::{ColumnPath, Predicate};
use crate::query::{Comparison, Condition, ConditionValue, Literal, Operator};

/// AND of `filter`, further AND-ed with the OR of `filter_or`
pub fn build_predicate(filter: &[Condition], filter_or: &[Condition]) -> Option<Predicate> {
    let mut parts: Vec<Predicate> = filter.iter().filter_map(lower_condition).collect();

    let alternatives: Vec<Predicate> = filter_or.iter().filter_map(lower_condition).collect();
    match alternatives.len() {
        0 => {}
        1 => parts.extend(alternatives),
        _ => parts.push(Predicate::Or(alternatives)),
    }

    Predicate::all(parts)
}

/// Lower one condition; `None` means the condition constrains nothing
pub fn lower_condition(condition: &Condition) -> Option<Predicate> {
    let column = ColumnPath::parse(&condition.key);
    let op = condition.operator;

    match (op, &condition.value) {
        (Operator::Eq, ConditionValue::Scalar(Literal::Null)) => Some(Predicate::IsNull(column)),
        (Operator::Not, ConditionValue::Scalar(Literal::Null)) => Some(Predicate::IsNotNull(column)),
        (Operator::Eq, ConditionValue::Scalar(value)) => Some(Predicate::Compare {
            column,
            op: Comparison::Eq,
            value: value.clone(),
        }),
        (Operator::Not, ConditionValue::Scalar(value)) => Some(Predicate::Compare {
            column,
            op: Comparison::NotEq,
            value: value.clone(),
        }),
        (Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte, ConditionValue::Scalar(value)) => {
            if value.is_null() {
                warn!(key = %condition.key, ?op, "dropping ordering filter with null value");
                return None;
            }
            Some(Predicate::Compare {
                column,
                op: op.comparison()?,
                value: value.clone(),
            })
        }
        (Operator::Regex, ConditionValue::Scalar(value)) => {
            non_null_text(condition, value).map(|pattern| Predicate::Regex { column, pattern })
        }
        (Operator::Exists, ConditionValue::Flag(true)) => Some(Predicate::IsNotNull(column)),
        (Operator::Exists, ConditionValue::Flag(false)) => Some(Predicate::IsNull(column)),
        (Operator::Contain | Operator::NotContain, ConditionValue::Scalar(value)) => {
            non_null_text(condition, value).map(|text| Predicate::Contains {
                column,
                text,
                negated: op == Operator::NotContain,
            })
        }
        (Operator::In | Operator::NotIn, ConditionValue::List(values)) => {
            Some(membership(column, values, op == Operator::NotIn))
        }
        (Operator::ContainIn | Operator::NotContainIn | Operator::RegexIn, ConditionValue::List(values)) => {
            let negated = op == Operator::NotContainIn;
            let items: Vec<Predicate> = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| {
                    if op == Operator::RegexIn {
                        Predicate::Regex {
                            column: column.clone(),
                            pattern: v.to_text(),
                        }
                    } else {
                        Predicate::Contains {
                            column: column.clone(),
                            text: v.to_text(),
                            negated,
                        }
                    }
                })
                .collect();
            if negated {
                Predicate::all(items)
            } else {
                match items.len() {
                    0 => Some(Predicate::Never),
                    1 => items.into_iter().next(),
                    _ => Some(Predicate::Or(items)),
                }
            }
        }
        (
            Operator::DatetimeGt | Operator::DatetimeGte | Operator::DatetimeLt | Operator::DatetimeLte,
            ConditionValue::Scalar(Literal::String(value)),
        ) => Some(Predicate::Datetime {
            column,
            op: op.comparison()?,
            value: value.clone(),
        }),
        (
            Operator::TimediffGt | Operator::TimediffGte | Operator::TimediffLt | Operator::TimediffLte,
            ConditionValue::Relative(value),
        ) => Some(Predicate::Timediff {
            column,
            op: op.comparison()?,
            value: *value,
        }),
        (_, value) => {
            warn!(key = %condition.key, ?op, ?value, "dropping condition with mismatched value");
            None
        }
    }
}

fn non_null_text(condition: &Condition, value: &Literal) -> Option<String> {
    if value.is_null() {
        warn!(key = %condition.key, op = ?condition.operator, "dropping text filter with null value");
        None
    } else {
        Some(value.to_text())
    }
}

/// `in` / `not_in` with explicit null handling
///
/// SQL `IN` never matches NULL, so a null in the list becomes its own
/// `IS [NOT] NULL` clause, OR-ed for `in` and AND-ed for `not_in`.
fn membership(column: ColumnPath, values: &[Literal], negated: bool) -> Predicate {
    if values.is_empty() {
        return Predicate::Never;
    }
    let has_null = values.iter().any(Literal::is_null);
    let non_null: Vec<Literal> = values.iter().filter(|v| !v.is_null()).cloned().collect();

    let mut parts = Vec::new();
    if !non_null.is_empty() {
        parts.push(Predicate::InList {
            column: column.clone(),
            values: non_null,
            negated,
        });
    }
    if has_null {
        parts.push(if negated {
            Predicate::IsNotNull(column)
        } else {
            Predicate::IsNull(column)
        });
    }

    if parts.len() == 1 {
        parts.remove(0)
    } else if negated {
        Predicate::And(parts)
    } else {
        Predicate::Or(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::RelativeTime;

    fn cond(key: &str, operator: Operator, value: ConditionValue) -> Condition {
        Condition { key: key.into(), operator, value }
    }

    fn s(v: &str) -> Literal {
        Literal::String(v.into())
    }

    #[test]
    fn test_null_equality() {
        let p = lower_condition(&cond("region_code", Operator::Eq, ConditionValue::Scalar(Literal::Null)));
        assert_eq!(p, Some(Predicate::IsNull(ColumnPath::parse("region_code"))));
        let p = lower_condition(&cond("region_code", Operator::Not, ConditionValue::Scalar(Literal::Null)));
        assert_eq!(p, Some(Predicate::IsNotNull(ColumnPath::parse("region_code"))));
    }

    #[test]
    fn test_null_ordering_dropped() {
        for op in [Operator::Lt, Operator::Lte, Operator::Gt, Operator::Gte] {
            assert_eq!(lower_condition(&cond("cost", op, ConditionValue::Scalar(Literal::Null))), None);
        }
    }

    #[test]
    fn test_in_with_null() {
        let p = lower_condition(&cond("provider", Operator::In, ConditionValue::List(vec![s("aws"), Literal::Null])));
        assert_eq!(
            p,
            Some(Predicate::Or(vec![
                Predicate::InList { column: ColumnPath::parse("provider"), values: vec![s("aws")], negated: false },
                Predicate::IsNull(ColumnPath::parse("provider")),
            ]))
        );

        let p = lower_condition(&cond("provider", Operator::NotIn, ConditionValue::List(vec![s("aws"), Literal::Null])));
        assert!(matches!(p, Some(Predicate::And(ref parts)) if parts.len() == 2));
    }

    #[test]
    fn test_empty_in_list() {
        assert_eq!(lower_condition(&cond("provider", Operator::In, ConditionValue::List(vec![]))), Some(Predicate::Never));
        assert_eq!(lower_condition(&cond("provider", Operator::NotIn, ConditionValue::List(vec![]))), Some(Predicate::Never));
    }

    #[test]
    fn test_only_null_in_list() {
        let p = lower_condition(&cond("provider", Operator::In, ConditionValue::List(vec![Literal::Null])));
        assert_eq!(p, Some(Predicate::IsNull(ColumnPath::parse("provider"))));
    }

    #[test]
    fn test_contain_in_families() {
        let p = lower_condition(&cond("product", Operator::ContainIn, ConditionValue::List(vec![s("ec2"), s("s3")])));
        assert!(matches!(p, Some(Predicate::Or(ref parts)) if parts.len() == 2));

        let p = lower_condition(&cond("product", Operator::NotContainIn, ConditionValue::List(vec![s("ec2"), s("s3")])));
        assert!(matches!(p, Some(Predicate::And(ref parts)) if parts.iter().all(|x| matches!(x, Predicate::Contains { negated: true, .. }))));

        let p = lower_condition(&cond("product", Operator::RegexIn, ConditionValue::List(vec![s("^ec2")])));
        assert_eq!(p, Some(Predicate::Regex { column: ColumnPath::parse("product"), pattern: "^ec2".into() }));
    }

    #[test]
    fn test_filter_or_combination() {
        let filter = vec![cond("provider", Operator::Eq, ConditionValue::Scalar(s("aws")))];
        let filter_or = vec![
            cond("region_code", Operator::Eq, ConditionValue::Scalar(s("us-east-1"))),
            cond("region_code", Operator::Eq, ConditionValue::Scalar(s("us-west-2"))),
        ];
        let p = build_predicate(&filter, &filter_or).unwrap();
        match p {
            Predicate::And(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[1], Predicate::Or(ref alts) if alts.len() == 2));
            }
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_timediff_lowering() {
        let rel = RelativeTime { day_start: true, offset: None };
        let p = lower_condition(&cond("updated_at", Operator::TimediffGte, ConditionValue::Relative(rel)));
        assert_eq!(
            p,
            Some(Predicate::Timediff { column: ColumnPath::parse("updated_at"), op: Comparison::Gte, value: rel })
        );
    }
}
