// Expression Tree
//
// This module defines the expression nodes the executor evaluates against rows.
// Aggregates are configured with these trees by the surrounding planner.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Column reference (could be qualified with table name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnReference {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnReference {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnReference { table: None, name: name.into() }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        ColumnReference { table: Some(table.into()), name: name.into() }
    }
}

impl fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Expression evaluated per row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Literal value
    Literal(Value),
    /// Column reference bound to an input column
    Column(ColumnReference),
    /// Column reference the planner has not bound yet
    UnresolvedColumn(ColumnReference),
    /// Binary operation (e.g., a + b, x = y)
    BinaryOp {
        left: Box<Expression>,
        op: Operator,
        right: Box<Expression>,
    },
    /// Unary operation (e.g., -a, NOT b)
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    /// CASE [operand] WHEN .. THEN .. [ELSE ..] END
    Case {
        operand: Option<Box<Expression>>,
        when_then_clauses: Vec<(Box<Expression>, Box<Expression>)>,
        else_clause: Option<Box<Expression>>,
    },
    /// expr IS [NOT] NULL
    IsNull {
        expr: Box<Expression>,
        not: bool,
    },
}

impl Expression {
    /// Shorthand for a bound, unqualified column reference
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(ColumnReference::new(name))
    }

    /// Shorthand for an unbound column reference
    pub fn unresolved(name: impl Into<String>) -> Self {
        Expression::UnresolvedColumn(ColumnReference::new(name))
    }

    pub fn literal(value: Value) -> Self {
        Expression::Literal(value)
    }

    /// Returns true when every column reference in the tree is bound.
    pub fn resolved(&self) -> bool {
        match self {
            Expression::Literal(_) | Expression::Column(_) => true,
            Expression::UnresolvedColumn(_) => false,
            Expression::BinaryOp { left, right, .. } => left.resolved() && right.resolved(),
            Expression::UnaryOp { expr, .. } => expr.resolved(),
            Expression::Case { operand, when_then_clauses, else_clause } => {
                operand.as_ref().is_none_or(|o| o.resolved())
                    && when_then_clauses.iter().all(|(w, t)| w.resolved() && t.resolved())
                    && else_clause.as_ref().is_none_or(|e| e.resolved())
            }
            Expression::IsNull { expr, .. } => expr.resolved(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::Column(col) => write!(f, "{}", col),
            Expression::UnresolvedColumn(col) => write!(f, "{}", col),
            Expression::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expression::UnaryOp { op, expr } => match op {
                UnaryOperator::Minus => write!(f, "-{}", expr),
                UnaryOperator::Not => write!(f, "NOT {}", expr),
            },
            Expression::Case { operand, when_then_clauses, else_clause } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", operand)?;
                }
                for (when, then) in when_then_clauses {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(else_expr) = else_clause {
                    write!(f, " ELSE {}", else_expr)?;
                }
                write!(f, " END")
            }
            Expression::IsNull { expr, not } => {
                if *not {
                    write!(f, "{} IS NOT NULL", expr)
                } else {
                    write!(f, "{} IS NULL", expr)
                }
            }
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    // Comparison
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessEquals,
    GreaterEquals,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessEquals => "<=",
            Operator::GreaterEquals => ">=",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Minus,
    Not,
}

/// Result types reported by expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    /// Text with effectively unbounded width
    LongText,
    Boolean,
    Date,
    Timestamp,
    Blob,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::Text => "TEXT",
            DataType::LongText => "LONGTEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Blob => "BLOB",
        };
        write!(f, "{}", name)
    }
}
