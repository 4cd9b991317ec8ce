//! Statement compilation.
//!
//! Each `compile_*` function renders one statement kind from a
//! [`QueryBuilder`]'s accumulated state, pushing parameter values onto the
//! shared [`Bindings`] list as it goes. Placeholder numbering is therefore a
//! single left-to-right pass: SET fields before WHERE for UPDATE, outer
//! clauses before EXISTS subquery clauses, and so on. The n-th `$n` in the
//! output always corresponds to the n-th binding.

use crate::binding::{Binding, Bindings};
use crate::builder::{QueryBuilder, SetValue};

/// Compile a SELECT statement.
pub fn compile_select(query: &QueryBuilder, bindings: &mut Bindings) -> String {
    let mut sql = String::from("SELECT ");
    if query.distinct {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&query.select_cols.join(", "));
    sql.push_str(" FROM ");
    sql.push_str(&query.table);

    for join in &query.join_clauses {
        sql.push(' ');
        sql.push_str(join);
    }

    push_where(&mut sql, query, bindings);

    if !query.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&query.group_by.join(", "));
    }

    let having = query.havings.build(bindings);
    if !having.is_empty() {
        sql.push_str(" HAVING ");
        sql.push_str(&having);
    }

    if !query.order_clauses.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&query.order_clauses.join(", "));
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = query.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    sql
}

/// Compile a COUNT statement.
///
/// GROUP BY/DISTINCT queries are wrapped in a subquery so the count reflects
/// the number of groups. A HAVING without GROUP BY (whole-table aggregate
/// filter) is carried through directly.
pub fn compile_count(query: &QueryBuilder, bindings: &mut Bindings) -> String {
    if !query.group_by.is_empty() || query.distinct {
        let sub = compile_select(&strip_paging(query), bindings);
        return format!("SELECT COUNT(*) FROM ({sub}) AS grouped");
    }

    let mut sql = String::from("SELECT COUNT(*) FROM ");
    sql.push_str(&query.table);
    for join in &query.join_clauses {
        sql.push(' ');
        sql.push_str(join);
    }
    push_where(&mut sql, query, bindings);
    push_having(&mut sql, query, bindings);
    sql
}

/// Compile an aggregate statement: `SELECT FUNC(column) FROM ...`.
///
/// A grouped query is wrapped as a subquery, so the aggregate runs over the
/// grouped rows; `column` must then name something the inner projection
/// exposes.
pub fn compile_aggregate(
    query: &QueryBuilder,
    func: &str,
    column: &str,
    bindings: &mut Bindings,
) -> String {
    if !query.group_by.is_empty() || query.distinct {
        let sub = compile_select(&strip_paging(query), bindings);
        return format!("SELECT {func}({column}) FROM ({sub}) AS grouped");
    }

    let mut sql = format!("SELECT {func}({column}) FROM {}", query.table);
    for join in &query.join_clauses {
        sql.push(' ');
        sql.push_str(join);
    }
    push_where(&mut sql, query, bindings);
    push_having(&mut sql, query, bindings);
    sql
}

fn strip_paging(query: &QueryBuilder) -> QueryBuilder {
    let mut inner = query.clone();
    inner.order_clauses.clear();
    inner.limit = None;
    inner.offset = None;
    inner
}

/// Compile an existence probe: `SELECT EXISTS (SELECT 1 FROM ...)`.
pub fn compile_exists(query: &QueryBuilder, bindings: &mut Bindings) -> String {
    let mut inner = query.clone();
    inner.select_cols = vec!["1".to_string()];
    inner.distinct = false;
    inner.order_clauses.clear();
    inner.limit = None;
    inner.offset = None;
    let sub = compile_select(&inner, bindings);
    format!("SELECT EXISTS ({sub})")
}

/// Compile a single-row INSERT from the staged SET fields.
///
/// `returning` adds a RETURNING clause for generated-key retrieval. With no
/// SET fields the statement inserts all-default values.
pub fn compile_insert(
    query: &QueryBuilder,
    returning: Option<&str>,
    bindings: &mut Bindings,
) -> String {
    let mut sql = format!("INSERT INTO {}", query.table);

    if query.set_fields.is_empty() {
        sql.push_str(" DEFAULT VALUES");
    } else {
        let mut columns = Vec::with_capacity(query.set_fields.len());
        let mut values = Vec::with_capacity(query.set_fields.len());
        for (column, value) in &query.set_fields {
            columns.push(column.as_str());
            match value {
                SetValue::Value(binding) => {
                    let idx = bindings.push_binding(binding.clone());
                    values.push(format!("${idx}"));
                }
                SetValue::Raw(expr) => values.push(expr.clone()),
            }
        }
        sql.push_str(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            values.join(", ")
        ));
    }

    if let Some(column) = returning {
        sql.push_str(&format!(" RETURNING {column}"));
    }
    sql
}

/// Compile a multi-row INSERT. Caller has already validated that every row
/// matches the column list length.
pub fn compile_insert_many(
    table: &str,
    columns: &[&str],
    rows: &[Vec<Binding>],
    bindings: &mut Bindings,
) -> String {
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let placeholders: Vec<String> = row
            .iter()
            .map(|value| {
                let idx = bindings.push_binding(value.clone());
                format!("${idx}")
            })
            .collect();
        tuples.push(format!("({})", placeholders.join(", ")));
    }
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        tuples.join(", ")
    )
}

/// Compile an UPDATE statement. SET values are numbered before WHERE values.
pub fn compile_update(query: &QueryBuilder, bindings: &mut Bindings) -> String {
    let mut sql = format!("UPDATE {} SET ", query.table);

    let assignments: Vec<String> = query
        .set_fields
        .iter()
        .map(|(column, value)| match value {
            SetValue::Value(binding) => {
                let idx = bindings.push_binding(binding.clone());
                format!("{column} = ${idx}")
            }
            SetValue::Raw(expr) => format!("{column} = {expr}"),
        })
        .collect();
    sql.push_str(&assignments.join(", "));

    push_where(&mut sql, query, bindings);
    sql
}

/// Compile a DELETE statement.
///
/// Without WHERE conditions the statement gets `WHERE 1=0` so an
/// accidentally unfiltered delete touches nothing. Full-table deletes
/// require an explicit opt-in on the builder.
pub fn compile_delete(query: &QueryBuilder, bindings: &mut Bindings) -> String {
    let mut sql = format!("DELETE FROM {}", query.table);
    let conditions = query.wheres.build(bindings);
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    } else if !query.allow_delete_all {
        sql.push_str(" WHERE 1=0");
    }
    sql
}

fn push_where(sql: &mut String, query: &QueryBuilder, bindings: &mut Bindings) {
    let conditions = query.wheres.build(bindings);
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }
}

fn push_having(sql: &mut String, query: &QueryBuilder, bindings: &mut Bindings) {
    let conditions = query.havings.build(bindings);
    if !conditions.is_empty() {
        sql.push_str(" HAVING ");
        sql.push_str(&conditions);
    }
}
