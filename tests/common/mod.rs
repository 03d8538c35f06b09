#![allow(dead_code)]

use groupcat::query::ast::Expression;
use groupcat::query::executor::context::ExecutionContext;
use groupcat::query::executor::operators::agg::{Aggregation, GroupConcat, GroupConcatBuffer};
use groupcat::query::executor::result::{DataValue, QueryResult, Row};

// Build a row from (column, value) pairs, keeping their order
pub fn row(pairs: &[(&str, DataValue)]) -> Row {
    let (columns, values): (Vec<String>, Vec<DataValue>) = pairs
        .iter()
        .map(|(col, val)| (col.to_string(), val.clone()))
        .unzip();
    Row::from_values(columns, values)
}

pub fn text(s: &str) -> DataValue {
    DataValue::Text(s.to_string())
}

pub fn col(name: &str) -> Expression {
    Expression::column(name)
}

// Rows with an integer `id` and a text `name`, ids following input order
pub fn named_rows(names: &[&str]) -> Vec<Row> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| row(&[("id", DataValue::Integer(i as i64)), ("name", text(name))]))
        .collect()
}

// Run every row through `update` on a fresh buffer
pub fn accumulate(agg: &GroupConcat, ctx: &ExecutionContext, rows: &[Row]) -> QueryResult<GroupConcatBuffer> {
    let mut buffer = agg.new_buffer();
    for row in rows {
        agg.update(ctx, &mut buffer, row)?;
    }
    Ok(buffer)
}

// Full single-buffer lifecycle
pub fn concat_all(agg: &GroupConcat, ctx: &ExecutionContext, rows: &[Row]) -> QueryResult<DataValue> {
    let buffer = accumulate(agg, ctx, rows)?;
    agg.eval(ctx, buffer)
}
