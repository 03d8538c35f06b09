use std::sync::Arc;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use groupcat::query::executor::context::{GROUP_CONCAT_MAX_LEN, Session};
use groupcat::query::executor::operators::agg::{
    GroupConcat, GroupConcatConfig, SortAggregateOperator, create_hash_aggregate, create_sort_aggregate,
};
use groupcat::query::executor::operators::sort::{SortSpec, create_sort_operator};
use groupcat::query::executor::operators::{Operator, collect_rows, create_values};
use groupcat::query::executor::result::{DataValue, QueryError, QueryResultSet, Row};

#[path = "../common/mod.rs"]
mod common;

use common::{col, row, text};

fn employees() -> Vec<Row> {
    [
        ("eng", "ann", 3),
        ("ops", "bob", 1),
        ("eng", "cid", 1),
        ("eng", "ann", 2),
        ("ops", "dee", 5),
        ("hr", "eve", 4),
    ]
    .iter()
    .map(|(dept, name, level)| {
        row(&[
            ("dept", text(dept)),
            ("name", text(name)),
            ("level", DataValue::Integer(*level)),
        ])
    })
    .collect()
}

fn names_by_level() -> Arc<GroupConcat> {
    Arc::new(GroupConcat::new(
        GroupConcatConfig::new(vec![col("name")])
            .distinct("name")
            .order_by(vec![SortSpec::asc(col("level"))]),
    ))
}

fn result_of(rows: &[Row], column: &str) -> Vec<DataValue> {
    rows.iter()
        .map(|r| r.get(column).cloned().unwrap_or(DataValue::Null))
        .collect()
}

#[test]
fn test_hash_aggregate_by_department() -> Result<()> {
    let input = create_values(employees())?;
    let op = create_hash_aggregate(input, vec!["dept".to_string()], names_by_level(), "names", Session::shared(), 1)?;
    let rows = collect_rows(&op)?;

    assert_eq!(result_of(&rows, "dept"), vec![text("eng"), text("ops"), text("hr")]);
    // ann appears twice in eng; the level-3 row arrived first and is the one kept
    assert_eq!(result_of(&rows, "names"), vec![text("cid,ann"), text("bob,dee"), text("eve")]);
    Ok(())
}

#[test]
fn test_parallel_hash_aggregate_matches_single_worker() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(2024);
    let rows: Vec<Row> = (0..500)
        .map(|i| {
            row(&[
                ("g", DataValue::Integer(rng.gen_range(0..7))),
                ("name", text(&format!("n{}", rng.gen_range(0..40)))),
                ("level", DataValue::Integer(i % 13)),
            ])
        })
        .collect();

    let run = |workers: usize| -> Result<Vec<Row>> {
        let input = create_values(rows.clone())?;
        let op = create_hash_aggregate(input, vec!["g".to_string()], names_by_level(), "names", Session::shared(), workers)?;
        Ok(collect_rows(&op)?)
    };

    let expected = run(1)?;
    assert_eq!(expected.len(), 7);
    for workers in [2, 3, 4, 8, 16] {
        assert_eq!(run(workers)?, expected, "workers = {}", workers);
    }
    Ok(())
}

#[test]
fn test_sort_aggregate_over_sorted_input() -> Result<()> {
    let session = Session::shared();
    let input = create_values(employees())?;
    let sorted = create_sort_operator(input, vec![SortSpec::asc(col("dept"))], session.clone())?;
    let op = create_sort_aggregate(sorted, vec!["dept".to_string()], names_by_level(), "names", session)?;
    let rows = collect_rows(&op)?;

    assert_eq!(result_of(&rows, "dept"), vec![text("eng"), text("hr"), text("ops")]);
    assert_eq!(result_of(&rows, "names"), vec![text("cid,ann"), text("eve"), text("bob,dee")]);
    Ok(())
}

#[test]
fn test_max_len_change_applies_to_later_groups() -> Result<()> {
    let session = Session::shared();
    let input = create_values(vec![
        row(&[("g", DataValue::Integer(1)), ("v", text("abcdef"))]),
        row(&[("g", DataValue::Integer(2)), ("v", text("ghijkl"))]),
    ])?;
    let agg = Arc::new(GroupConcat::new(GroupConcatConfig::new(vec![col("v")])));
    let mut op = SortAggregateOperator::new(input, vec!["g".to_string()], agg, "v_concat", session.clone());

    op.init()?;
    let first = op.next()?.map(|r| r.get("v_concat").cloned());
    session.set_variable(GROUP_CONCAT_MAX_LEN, DataValue::Integer(2))?;
    let second = op.next()?.map(|r| r.get("v_concat").cloned());
    assert!(op.next()?.is_none());
    op.close()?;

    assert_eq!(first, Some(Some(text("abcdef"))));
    assert_eq!(second, Some(Some(text("gh"))));
    Ok(())
}

#[test]
fn test_session_max_len_reaches_hash_aggregate() -> Result<()> {
    let session = Session::shared();
    session.set_variable(GROUP_CONCAT_MAX_LEN, DataValue::Integer(5))?;
    let input = create_values(employees())?;
    let agg = Arc::new(GroupConcat::new(GroupConcatConfig::new(vec![col("name")])));
    let op = create_hash_aggregate(input, vec![], agg, "all", session, 2)?;
    let rows = collect_rows(&op)?;
    assert_eq!(result_of(&rows, "all"), vec![text("ann,b")]);
    Ok(())
}

#[test]
fn test_invalid_session_values_are_rejected() {
    let session = Session::new();
    assert!(matches!(
        session.set_variable(GROUP_CONCAT_MAX_LEN, DataValue::Integer(-1)),
        Err(QueryError::ConfigurationError(_))
    ));
    assert!(matches!(
        session.set_variable(GROUP_CONCAT_MAX_LEN, text("big")),
        Err(QueryError::ConfigurationError(_))
    ));
    assert!(matches!(
        session.set_variable("no_such_variable", DataValue::Integer(1)),
        Err(QueryError::ConfigurationError(_))
    ));
}

#[test]
fn test_group_error_fails_the_query() -> Result<()> {
    let input = create_values(vec![
        row(&[("g", DataValue::Integer(1)), ("k", DataValue::Integer(1)), ("v", text("a"))]),
        row(&[("g", DataValue::Integer(1)), ("k", text("x")), ("v", text("b"))]),
    ])?;
    let agg = Arc::new(GroupConcat::new(
        GroupConcatConfig::new(vec![col("v")]).order_by(vec![SortSpec::asc(col("k"))]),
    ));
    let op = create_hash_aggregate(input, vec!["g".to_string()], agg, "out", Session::shared(), 1)?;
    assert!(matches!(collect_rows(&op), Err(QueryError::TypeError(_))));
    Ok(())
}

#[test]
fn test_result_set_rendering() -> Result<()> {
    let input = create_values(employees())?;
    let op = create_hash_aggregate(input, vec!["dept".to_string()], names_by_level(), "names", Session::shared(), 1)?;

    let mut result_set = QueryResultSet::new(vec!["dept".to_string(), "names".to_string()]);
    for r in collect_rows(&op)? {
        result_set.add_row(r);
    }

    assert_eq!(result_set.row_count(), 3);
    let table = result_set.to_string_table();
    assert!(table.contains("| dept | names | "));
    assert!(table.contains("\"cid,ann\""));
    assert!(result_set.to_json_lines().starts_with("{\"dept\":\"eng\",\"names\":\"cid,ann\"}"));
    Ok(())
}
