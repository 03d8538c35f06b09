// Expression Evaluation Utility

use std::cmp::Ordering;

use crate::query::ast::{Expression, Value, Operator, UnaryOperator};
use crate::query::executor::context::ExecutionContext;
use crate::query::executor::result::{Row, DataValue, QueryResult, QueryError};

/// Evaluates expressions against rows on behalf of operators and aggregates.
pub trait RowEvaluator: Send + Sync {
    fn evaluate(&self, expr: &Expression, row: &Row, ctx: &ExecutionContext) -> QueryResult<DataValue>;

    /// Evaluate a list of expressions, failing on the first error.
    fn evaluate_all(&self, exprs: &[Expression], row: &Row, ctx: &ExecutionContext) -> QueryResult<Vec<DataValue>> {
        exprs.iter().map(|expr| self.evaluate(expr, row, ctx)).collect()
    }
}

/// Tree-walking evaluator for [`Expression`]
#[derive(Debug, Default, Clone, Copy)]
pub struct AstEvaluator;

impl RowEvaluator for AstEvaluator {
    fn evaluate(&self, expr: &Expression, row: &Row, _ctx: &ExecutionContext) -> QueryResult<DataValue> {
        evaluate_expression(expr, row)
    }
}

fn lookup_column(col_ref: &crate::query::ast::ColumnReference, row: &Row) -> QueryResult<DataValue> {
    if let Some(table) = &col_ref.table {
        if let Some(value) = row.get(&format!("{}.{}", table, col_ref.name)) {
            return Ok(value.clone());
        }
    }

    if let Some(value) = row.get(&col_ref.name) {
        return Ok(value.clone());
    }

    // Unqualified reference against qualified row keys ("t.name")
    if col_ref.table.is_none() {
        let suffix = format!(".{}", col_ref.name);
        for column in row.columns() {
            if column.ends_with(&suffix) {
                if let Some(value) = row.get(column) {
                    return Ok(value.clone());
                }
            }
        }
    }

    Err(QueryError::ColumnNotFound(format!(
        "Column '{}' not found in row with columns [{}]",
        col_ref, row.columns().join(", ")
    )))
}

fn compare_for_predicate(left: &DataValue, right: &DataValue, op: Operator) -> QueryResult<Ordering> {
    left.partial_cmp(right).ok_or_else(|| {
        QueryError::TypeError(format!("Cannot compare {:?} {} {:?}", left, op, right))
    })
}

// Evaluate an expression in the context of a single row.
pub fn evaluate_expression(expr: &Expression, row: &Row) -> QueryResult<DataValue> {
    match expr {
        Expression::Literal(val) => {
            match val {
                Value::Integer(i) => Ok(DataValue::Integer(*i)),
                Value::Float(f) => Ok(DataValue::Float(*f)),
                Value::String(s) => Ok(DataValue::Text(s.clone())),
                Value::Boolean(b) => Ok(DataValue::Boolean(*b)),
                Value::Null => Ok(DataValue::Null),
            }
        }
        Expression::Column(col_ref) => lookup_column(col_ref, row),
        Expression::UnresolvedColumn(col_ref) => Err(QueryError::InvalidOperation(format!(
            "Column '{}' has not been resolved", col_ref
        ))),
        Expression::BinaryOp { left, op, right } => {
            let left_val = evaluate_expression(left, row)?;
            let right_val = evaluate_expression(right, row)?;

            // op(NULL, _) -> NULL, op(_, NULL) -> NULL
            if left_val.is_null() || right_val.is_null() {
                return Ok(DataValue::Null);
            }

            match op {
                Operator::Equals => Ok(DataValue::Boolean(left_val == right_val)),
                Operator::NotEquals => Ok(DataValue::Boolean(left_val != right_val)),
                Operator::LessThan => Ok(DataValue::Boolean(compare_for_predicate(&left_val, &right_val, *op)? == Ordering::Less)),
                Operator::GreaterThan => Ok(DataValue::Boolean(compare_for_predicate(&left_val, &right_val, *op)? == Ordering::Greater)),
                Operator::LessEquals => Ok(DataValue::Boolean(compare_for_predicate(&left_val, &right_val, *op)? != Ordering::Greater)),
                Operator::GreaterEquals => Ok(DataValue::Boolean(compare_for_predicate(&left_val, &right_val, *op)? != Ordering::Less)),
                Operator::Plus => {
                    match (left_val, right_val) {
                        (DataValue::Integer(l), DataValue::Integer(r)) => Ok(DataValue::Integer(l.checked_add(r).ok_or(QueryError::NumericOverflow)?)),
                        (DataValue::Float(l), DataValue::Float(r)) => Ok(DataValue::Float(l + r)),
                        (DataValue::Integer(l), DataValue::Float(r)) => Ok(DataValue::Float(l as f64 + r)),
                        (DataValue::Float(l), DataValue::Integer(r)) => Ok(DataValue::Float(l + r as f64)),
                        _ => Err(QueryError::TypeError("Unsupported types for + operator".to_string()))
                    }
                }
                Operator::Minus => {
                    match (left_val, right_val) {
                        (DataValue::Integer(l), DataValue::Integer(r)) => Ok(DataValue::Integer(l.checked_sub(r).ok_or(QueryError::NumericOverflow)?)),
                        (DataValue::Float(l), DataValue::Float(r)) => Ok(DataValue::Float(l - r)),
                        (DataValue::Integer(l), DataValue::Float(r)) => Ok(DataValue::Float(l as f64 - r)),
                        (DataValue::Float(l), DataValue::Integer(r)) => Ok(DataValue::Float(l - r as f64)),
                        _ => Err(QueryError::TypeError("Unsupported types for - operator".to_string()))
                    }
                }
                Operator::Multiply => {
                    match (left_val, right_val) {
                        (DataValue::Integer(l), DataValue::Integer(r)) => Ok(DataValue::Integer(l.checked_mul(r).ok_or(QueryError::NumericOverflow)?)),
                        (DataValue::Float(l), DataValue::Float(r)) => Ok(DataValue::Float(l * r)),
                        (DataValue::Integer(l), DataValue::Float(r)) => Ok(DataValue::Float(l as f64 * r)),
                        (DataValue::Float(l), DataValue::Integer(r)) => Ok(DataValue::Float(l * r as f64)),
                        _ => Err(QueryError::TypeError("Unsupported types for * operator".to_string()))
                    }
                }
                Operator::Divide => {
                    match (left_val, right_val) {
                        // Integer division truncates
                        (DataValue::Integer(_), DataValue::Integer(0)) => Err(QueryError::DivisionByZero),
                        (DataValue::Integer(l), DataValue::Integer(r)) => Ok(DataValue::Integer(l.checked_div(r).ok_or(QueryError::NumericOverflow)?)),
                        (DataValue::Float(l), DataValue::Float(r)) => {
                            if r == 0.0 { Err(QueryError::DivisionByZero) } else { Ok(DataValue::Float(l / r)) }
                        }
                        (DataValue::Integer(l), DataValue::Float(r)) => {
                            if r == 0.0 { Err(QueryError::DivisionByZero) } else { Ok(DataValue::Float(l as f64 / r)) }
                        }
                        (DataValue::Float(l), DataValue::Integer(r)) => {
                            if r == 0 { Err(QueryError::DivisionByZero) } else { Ok(DataValue::Float(l / r as f64)) }
                        }
                        _ => Err(QueryError::TypeError("Unsupported types for / operator".to_string()))
                    }
                }
                Operator::Modulo => {
                    match (left_val, right_val) {
                        (DataValue::Integer(_), DataValue::Integer(0)) => Err(QueryError::DivisionByZero),
                        (DataValue::Integer(l), DataValue::Integer(r)) => Ok(DataValue::Integer(l.checked_rem(r).ok_or(QueryError::NumericOverflow)?)),
                        _ => Err(QueryError::TypeError("Modulo operator only supports integers".to_string()))
                    }
                }
                Operator::And => {
                    match (left_val, right_val) {
                        (DataValue::Boolean(l), DataValue::Boolean(r)) => Ok(DataValue::Boolean(l && r)),
                        _ => Err(QueryError::TypeError("AND requires boolean operands".to_string()))
                    }
                }
                Operator::Or => {
                    match (left_val, right_val) {
                        (DataValue::Boolean(l), DataValue::Boolean(r)) => Ok(DataValue::Boolean(l || r)),
                        _ => Err(QueryError::TypeError("OR requires boolean operands".to_string()))
                    }
                }
            }
        }
        Expression::UnaryOp { op, expr } => {
            let val = evaluate_expression(expr, row)?;
            match op {
                UnaryOperator::Minus => {
                    match val {
                        DataValue::Integer(i) => Ok(DataValue::Integer(i.checked_neg().ok_or(QueryError::NumericOverflow)?)),
                        DataValue::Float(f) => Ok(DataValue::Float(-f)),
                        DataValue::Null => Ok(DataValue::Null),
                        _ => Err(QueryError::TypeError(format!("Unary minus not supported for type {:?}", val.get_type())))
                    }
                }
                UnaryOperator::Not => {
                    // NOT NULL -> NULL
                    match val {
                        DataValue::Boolean(b) => Ok(DataValue::Boolean(!b)),
                        DataValue::Null => Ok(DataValue::Null),
                        _ => Err(QueryError::TypeError(format!("Unary NOT requires a boolean or NULL operand, got {:?}", val.get_type())))
                    }
                }
            }
        }
        Expression::Case { operand, when_then_clauses, else_clause } => {
            let operand_value = match operand {
                Some(op_expr) => Some(evaluate_expression(op_expr, row)?),
                None => None,
            };

            for (when_expr, then_expr) in when_then_clauses {
                let condition_met = match &operand_value {
                    // Simple CASE: NULL never matches
                    Some(op_val) => {
                        let current_when_value = evaluate_expression(when_expr, row)?;
                        !op_val.is_null() && !current_when_value.is_null() && op_val == &current_when_value
                    }
                    // Searched CASE: a NULL condition counts as false
                    None => {
                        match evaluate_expression(when_expr, row)? {
                            DataValue::Boolean(b) => b,
                            DataValue::Null => false,
                            _ => return Err(QueryError::TypeError("CASE WHEN condition did not evaluate to a boolean or NULL".to_string())),
                        }
                    }
                };

                if condition_met {
                    return evaluate_expression(then_expr, row);
                }
            }

            match else_clause {
                Some(else_expr) => evaluate_expression(else_expr, row),
                None => Ok(DataValue::Null),
            }
        }
        Expression::IsNull { expr, not } => {
            let result = evaluate_expression(expr, row)?.is_null();
            Ok(DataValue::Boolean(if *not { !result } else { result }))
        }
    }
}
