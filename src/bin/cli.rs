use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, ValueEnum};
use linked_hash_map::LinkedHashMap;
use log::info;
use tracing_subscriber::EnvFilter;

use groupcat::query::ast::Expression;
use groupcat::query::executor::context::{GROUP_CONCAT_MAX_LEN, Session};
use groupcat::query::executor::operators::agg::{
    GroupConcat, GroupConcatConfig, create_hash_aggregate, create_sort_aggregate,
};
use groupcat::query::executor::operators::sort::{NullOrdering, SortDirection, SortSpec, create_sort_operator};
use groupcat::query::executor::operators::{collect_rows, create_values};
use groupcat::query::executor::result::{DataValue, QueryResultSet, Row};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(author, version, about = "groupcat - GROUP_CONCAT over JSON-lines input")]
struct Cli {
    /// Input file with one JSON object per line (reads stdin when omitted)
    input: Option<PathBuf>,

    /// Column to group by (repeatable)
    #[arg(short, long = "group-by", value_name = "COL")]
    group_by: Vec<String>,

    /// Value column; the first one is concatenated (repeatable)
    #[arg(short = 'v', long = "value", value_name = "COL", required = true)]
    values: Vec<String>,

    /// Drop repeated values within a group
    #[arg(short, long)]
    distinct: bool,

    /// Order values within a group (repeatable)
    #[arg(long = "order-by", value_name = "COL[:asc|desc][:nulls-first|nulls-last]")]
    order_by: Vec<String>,

    /// Separator placed between values
    #[arg(short, long, default_value = ",")]
    separator: String,

    /// Override the session's group_concat_max_len
    #[arg(short, long)]
    max_len: Option<i64>,

    /// Number of worker threads for hash aggregation
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Sort the input by the group columns and aggregate it in one streaming pass
    #[arg(long)]
    streaming: bool,

    /// Name of the result column (defaults to the rendered aggregate)
    #[arg(long)]
    alias: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

/// Parse `COL[:asc|desc][:nulls-first|nulls-last]`
fn parse_order_by(spec: &str) -> Result<SortSpec> {
    let mut parts = spec.split(':');
    let column = parts
        .next()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("Empty --order-by specification"))?;

    let mut direction = SortDirection::Ascending;
    let mut nulls = None;
    for part in parts {
        match part.to_ascii_lowercase().as_str() {
            "asc" => direction = SortDirection::Ascending,
            "desc" => direction = SortDirection::Descending,
            "nulls-first" => nulls = Some(NullOrdering::NullsFirst),
            "nulls-last" => nulls = Some(NullOrdering::NullsLast),
            other => bail!("Unknown modifier '{}' in --order-by '{}'", other, spec),
        }
    }

    let sort = SortSpec::new(Expression::column(column), direction);
    Ok(match nulls {
        Some(nulls) => sort.with_nulls(nulls),
        None => sort,
    })
}

/// Read one JSON object per line, keeping each object's key order
fn read_rows(reader: impl BufRead) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let object: LinkedHashMap<String, serde_json::Value> = serde_json::from_str(&line)
            .with_context(|| format!("Line {} is not a JSON object", index + 1))?;
        let values = object
            .iter()
            .map(|(column, value)| (column.clone(), DataValue::from_json(value)))
            .collect::<LinkedHashMap<_, _>>();
        rows.push(Row::from_ordered_map(values));
    }
    Ok(rows)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let rows = match &cli.input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
            read_rows(BufReader::new(file))?
        }
        None => read_rows(io::stdin().lock())?,
    };
    info!("read {} input rows", rows.len());

    let session = Session::shared();
    if let Some(max_len) = cli.max_len {
        session
            .set_variable(GROUP_CONCAT_MAX_LEN, DataValue::Integer(max_len))
            .context("Invalid --max-len")?;
    }

    let order_by = cli
        .order_by
        .iter()
        .map(String::as_str)
        .map(parse_order_by)
        .collect::<Result<Vec<_>>>()?;

    let mut config = GroupConcatConfig::new(cli.values.iter().map(Expression::column).collect())
        .order_by(order_by)
        .separator(cli.separator.clone());
    if cli.distinct {
        if let Some(first) = cli.values.first() {
            config = config.distinct(first.clone());
        }
    }

    let aggregation = Arc::new(GroupConcat::new(config));
    let output_column = cli.alias.clone().unwrap_or_else(|| aggregation.to_string());

    let input = create_values(rows)?;
    let operator = if cli.streaming {
        let group_order = cli.group_by.iter().map(|col| SortSpec::asc(Expression::column(col))).collect();
        let sorted = create_sort_operator(input, group_order, session.clone())?;
        create_sort_aggregate(sorted, cli.group_by.clone(), aggregation, output_column.clone(), session)?
    } else {
        create_hash_aggregate(input, cli.group_by.clone(), aggregation, output_column.clone(), session, cli.workers)?
    };

    let mut columns = cli.group_by.clone();
    columns.push(output_column);
    let mut result_set = QueryResultSet::new(columns);
    for row in collect_rows(&operator)? {
        result_set.add_row(row);
    }

    match cli.output {
        OutputFormat::Table => {
            print!("{}", result_set.to_string_table());
            println!("({} rows)", result_set.row_count());
        }
        OutputFormat::Json => print!("{}", result_set.to_json_lines()),
    }

    Ok(())
}
