use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use groupcat::query::ast::{DataType, Expression, Operator, Value};
use groupcat::query::executor::context::ExecutionContext;
use groupcat::query::executor::expression_eval::{AstEvaluator, RowEvaluator};
use groupcat::query::executor::operators::agg::{
    AggregateDescriptor, Aggregation, Capabilities, GroupConcat, GroupConcatConfig, VALUE_COLUMN,
};
use groupcat::query::executor::operators::sort::{NullOrdering, SortSpec, StableSorter};
use groupcat::query::executor::result::{DataValue, QueryError, QueryResult, Row};
use groupcat::query::executor::type_conversion::{LongTextConverter, TextConversion, TextConverter};

#[path = "../common/mod.rs"]
mod common;

use common::{col, concat_all, named_rows, row, text};

fn ctx() -> ExecutionContext {
    ExecutionContext::default()
}

#[test]
fn test_plain_concatenation() -> Result<()> {
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("name")]));
    assert_eq!(concat_all(&agg, &ctx(), &named_rows(&["a", "b", "a", "c"]))?, text("a,b,a,c"));
    Ok(())
}

#[test]
fn test_distinct() -> Result<()> {
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("name")]).distinct("name"));
    assert_eq!(concat_all(&agg, &ctx(), &named_rows(&["a", "b", "a", "c"]))?, text("a,b,c"));
    Ok(())
}

#[test]
fn test_distinct_uses_converted_text() -> Result<()> {
    // 1 and "1" convert to the same text and are duplicates of each other
    let rows = vec![
        row(&[("v", DataValue::Integer(1))]),
        row(&[("v", text("1"))]),
        row(&[("v", DataValue::Boolean(true))]),
    ];
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("v")]).distinct("v"));
    assert_eq!(concat_all(&agg, &ctx(), &rows)?, text("1,true"));
    Ok(())
}

#[test]
fn test_order_by_descending_with_separator() -> Result<()> {
    let rows = vec![
        row(&[("k", DataValue::Integer(2)), ("v", text("b"))]),
        row(&[("k", DataValue::Integer(3)), ("v", text("c"))]),
        row(&[("k", DataValue::Integer(1)), ("v", text("a"))]),
    ];
    let agg = GroupConcat::new(
        GroupConcatConfig::new(vec![col("v")])
            .order_by(vec![SortSpec::desc(col("k"))])
            .separator(";"),
    );
    assert_eq!(concat_all(&agg, &ctx(), &rows)?, text("c;b;a"));
    Ok(())
}

#[test]
fn test_multi_key_order_is_stable() -> Result<()> {
    let rows = vec![
        row(&[("a", DataValue::Integer(1)), ("b", DataValue::Integer(2)), ("v", text("first"))]),
        row(&[("a", DataValue::Integer(0)), ("b", DataValue::Integer(9)), ("v", text("second"))]),
        row(&[("a", DataValue::Integer(1)), ("b", DataValue::Integer(2)), ("v", text("third"))]),
        row(&[("a", DataValue::Integer(1)), ("b", DataValue::Integer(1)), ("v", text("fourth"))]),
    ];
    let agg = GroupConcat::new(
        GroupConcatConfig::new(vec![col("v")])
            .order_by(vec![SortSpec::asc(col("a")), SortSpec::asc(col("b"))]),
    );
    assert_eq!(concat_all(&agg, &ctx(), &rows)?, text("second,fourth,first,third"));
    Ok(())
}

#[test]
fn test_null_placement_is_independent_of_direction() -> Result<()> {
    let rows = vec![
        row(&[("k", DataValue::Integer(1)), ("v", text("one"))]),
        row(&[("k", DataValue::Null), ("v", text("null"))]),
        row(&[("k", DataValue::Integer(2)), ("v", text("two"))]),
    ];
    let cases = [
        (SortSpec::asc(col("k")), "null,one,two"),
        (SortSpec::desc(col("k")), "two,one,null"),
        (SortSpec::asc(col("k")).with_nulls(NullOrdering::NullsLast), "one,two,null"),
        (SortSpec::desc(col("k")).with_nulls(NullOrdering::NullsFirst), "null,two,one"),
    ];
    for (spec, expected) in cases {
        let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("v")]).order_by(vec![spec]));
        assert_eq!(concat_all(&agg, &ctx(), &rows)?, text(expected));
    }
    Ok(())
}

#[test]
fn test_order_by_computed_expression() -> Result<()> {
    let negated = Expression::BinaryOp {
        left: Box::new(Expression::literal(Value::Integer(0))),
        op: Operator::Minus,
        right: Box::new(col("id")),
    };
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("name")]).order_by(vec![SortSpec::asc(negated)]));
    assert_eq!(concat_all(&agg, &ctx(), &named_rows(&["x", "y", "z"]))?, text("z,y,x"));
    Ok(())
}

#[test]
fn test_truncation_by_context() -> Result<()> {
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("name")]).separator(""));
    let rows = named_rows(&["abc", "def"]);
    assert_eq!(concat_all(&agg, &ExecutionContext::with_group_concat_max_len(3), &rows)?, text("abc"));
    assert_eq!(concat_all(&agg, &ExecutionContext::with_group_concat_max_len(6), &rows)?, text("abcdef"));
    assert_eq!(concat_all(&agg, &ExecutionContext::with_group_concat_max_len(0), &rows)?, text(""));
    Ok(())
}

#[test]
fn test_default_max_len_is_1024() -> Result<()> {
    let long = "x".repeat(600);
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("name")]));
    let result = concat_all(&agg, &ctx(), &named_rows(&[&long, &long]))?;
    match result {
        DataValue::Text(s) => assert_eq!(s.chars().count(), 1024),
        other => panic!("expected text, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_empty_group_and_all_null_group() -> Result<()> {
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("v")]));
    assert_eq!(concat_all(&agg, &ctx(), &[])?, DataValue::Null);
    let nulls = vec![row(&[("v", DataValue::Null)]), row(&[("v", DataValue::Null)])];
    assert_eq!(concat_all(&agg, &ctx(), &nulls)?, DataValue::Null);
    Ok(())
}

#[test]
fn test_value_conversions() -> Result<()> {
    let rows = vec![
        row(&[("v", DataValue::Float(1.5))]),
        row(&[("v", DataValue::Boolean(false))]),
        row(&[("v", DataValue::Blob(vec![0xde, 0xad]))]),
        row(&[("v", DataValue::Date("2024-01-02".to_string()))]),
    ];
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("v")]).separator("|"));
    assert_eq!(concat_all(&agg, &ctx(), &rows)?, text("1.5|false|dead|2024-01-02"));
    Ok(())
}

#[test]
fn test_sort_comparison_error_aborts() {
    let rows = vec![
        row(&[("k", DataValue::Integer(1)), ("v", text("a"))]),
        row(&[("k", text("z")), ("v", text("b"))]),
    ];
    let agg = GroupConcat::new(GroupConcatConfig::new(vec![col("v")]).order_by(vec![SortSpec::asc(col("k"))]));
    assert!(matches!(concat_all(&agg, &ctx(), &rows), Err(QueryError::TypeError(_))));
}

#[test]
fn test_sort_key_evaluation_error_aborts() {
    let agg = GroupConcat::new(
        GroupConcatConfig::new(vec![col("name")]).order_by(vec![SortSpec::asc(col("missing"))]),
    );
    let result = concat_all(&agg, &ctx(), &named_rows(&["a", "b"]));
    assert!(matches!(result, Err(QueryError::ColumnNotFound(_))));
}

#[test]
fn test_sort_sees_value_column() -> Result<()> {
    let agg = GroupConcat::new(
        GroupConcatConfig::new(vec![col("name")]).order_by(vec![SortSpec::asc(col(VALUE_COLUMN))]),
    );
    assert_eq!(concat_all(&agg, &ctx(), &named_rows(&["pear", "apple", "fig"]))?, text("apple,fig,pear"));
    Ok(())
}

/// Evaluator that counts its calls before delegating to the tree walker
#[derive(Default)]
struct CountingEvaluator {
    calls: AtomicUsize,
}

impl RowEvaluator for CountingEvaluator {
    fn evaluate(&self, expr: &Expression, row: &Row, ctx: &ExecutionContext) -> QueryResult<DataValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AstEvaluator.evaluate(expr, row, ctx)
    }
}

/// Converter that upper-cases text and maps "SKIP" to NULL
struct ShoutingConverter;

impl TextConverter for ShoutingConverter {
    fn to_long_text(&self, value: &DataValue) -> QueryResult<TextConversion> {
        match LongTextConverter.to_long_text(value)? {
            TextConversion::Text(s) if s == "skip" => Ok(TextConversion::Null),
            TextConversion::Text(s) => Ok(TextConversion::Text(s.to_uppercase())),
            TextConversion::Null => Ok(TextConversion::Null),
        }
    }
}

#[test]
fn test_injected_capabilities() -> Result<()> {
    let evaluator = Arc::new(CountingEvaluator::default());
    let capabilities = Capabilities {
        evaluator: evaluator.clone(),
        converter: Arc::new(ShoutingConverter),
        sorter: Arc::new(StableSorter),
    };
    let agg = GroupConcat::with_capabilities(
        GroupConcatConfig::new(vec![col("name")]).order_by(vec![SortSpec::desc(col("id"))]),
        capabilities,
    );

    let result = concat_all(&agg, &ctx(), &named_rows(&["a", "skip", "b"]))?;
    assert_eq!(result, text("B,A"));
    // three value evaluations plus one sort key per accepted row
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 5);
    Ok(())
}

#[test]
fn test_descriptor_surface() -> Result<()> {
    let agg = GroupConcat::new(
        GroupConcatConfig::new(vec![col("a"), col("b")])
            .order_by(vec![SortSpec::asc(col("c")).with_nulls(NullOrdering::NullsLast)])
            .separator(" "),
    );
    assert_eq!(agg.to_string(), "group_concat(a, b order by c ASC NULLS LAST separator ' ')");
    assert_eq!(agg.function_name(), "group_concat");
    assert_eq!(agg.data_type(), DataType::LongText);
    assert!(agg.is_nullable());
    assert_eq!(agg.children(), vec![col("c"), col("a"), col("b")]);

    let rebuilt = agg.with_children(agg.children())?;
    assert_eq!(rebuilt.to_string(), agg.to_string());

    let fresh = rebuilt.new_buffer();
    assert!(fresh.is_empty());
    Ok(())
}
