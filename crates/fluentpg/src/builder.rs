//! Fluent query builder.
//!
//! [`table`] starts a [`QueryBuilder`] for one table. Chained methods
//! accumulate clause state; terminal methods compile it into a single
//! parameterized statement plus an ordered binding list (see
//! [`crate::grammar`]) and execute it against any [`Executor`].
//!
//! ```ignore
//! use fluentpg::table;
//!
//! let users = table("users")
//!     .eq("status", "active")
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .get(&client)
//!     .await?;
//!
//! table("users")
//!     .set("status", "inactive")
//!     .eq("id", user_id)
//!     .update(&client)
//!     .await?;
//! ```

use crate::binding::{Binding, Bindings};
use crate::clause::{check_operator, Clause, ClauseGroup, DatePart};
use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use crate::grammar;
use crate::row::FromRow;
use chrono::{NaiveDate, NaiveTime};
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::Row;

/// Create a query builder for the given table.
///
/// # Example
/// ```ignore
/// let qb = fluentpg::table("users").eq("id", 1i64);
/// ```
pub fn table(name: &str) -> QueryBuilder {
    QueryBuilder::new(name)
}

/// SET field value for INSERT/UPDATE payloads.
#[derive(Clone, Debug)]
pub(crate) enum SetValue {
    /// Parameterized value
    Value(Binding),
    /// Raw SQL expression (e.g. "NOW()")
    Raw(String),
}

/// Fluent query builder over one table.
///
/// The builder is single-owner mutable state: chaining methods consume and
/// return `Self`. It is `Clone` (bindings are Arc-shared), which the
/// pagination helpers rely on.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    /// Table or FROM expression
    pub(crate) table: String,
    /// SELECT columns (default ["*"])
    pub(crate) select_cols: Vec<String>,
    /// SELECT DISTINCT
    pub(crate) distinct: bool,
    /// JOIN clauses
    pub(crate) join_clauses: Vec<String>,
    /// WHERE conditions
    pub(crate) wheres: ClauseGroup,
    /// GROUP BY columns
    pub(crate) group_by: Vec<String>,
    /// HAVING conditions
    pub(crate) havings: ClauseGroup,
    /// ORDER BY clauses
    pub(crate) order_clauses: Vec<String>,
    /// LIMIT
    pub(crate) limit: Option<i64>,
    /// OFFSET
    pub(crate) offset: Option<i64>,
    /// Primary key column, used by `find`, `insert_get_id` and `chunk`
    pub(crate) primary_key: String,
    /// SET fields for INSERT/UPDATE
    pub(crate) set_fields: Vec<(String, SetValue)>,
    /// Whether DELETE without WHERE is allowed
    pub(crate) allow_delete_all: bool,
    /// Deferred build error, reported by `validate()` before execution
    pub(crate) build_error: Option<String>,
}

impl QueryBuilder {
    /// Create a new query builder for a table.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            select_cols: vec!["*".to_string()],
            distinct: false,
            join_clauses: Vec::new(),
            wheres: ClauseGroup::new(),
            group_by: Vec::new(),
            havings: ClauseGroup::new(),
            order_clauses: Vec::new(),
            limit: None,
            offset: None,
            primary_key: "id".to_string(),
            set_fields: Vec::new(),
            allow_delete_all: false,
            build_error: None,
        }
    }

    fn record_error(&mut self, message: String) {
        // First error wins; it points at the earliest misuse.
        if self.build_error.is_none() {
            self.build_error = Some(message);
        }
    }

    /// Override the primary key column (default `id`).
    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = column.to_string();
        self
    }

    // ==================== SELECT columns ====================

    /// Set SELECT columns (string form, supports complex expressions).
    pub fn select(mut self, cols: &str) -> Self {
        self.select_cols = vec![cols.to_string()];
        self
    }

    /// Set SELECT columns (array form).
    pub fn select_cols(mut self, cols: &[&str]) -> Self {
        self.select_cols = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Append one SELECT column.
    pub fn add_select(mut self, col: &str) -> Self {
        if self.select_cols.len() == 1 && self.select_cols[0] == "*" {
            self.select_cols[0] = col.to_string();
        } else {
            self.select_cols.push(col.to_string());
        }
        self
    }

    /// Append a raw SELECT expression (e.g. `COUNT(*) AS count`).
    ///
    /// Identifiers and expressions in the select list are always emitted
    /// literally; this alias exists to make the trust boundary explicit at
    /// the call site.
    pub fn select_raw(self, expr: &str) -> Self {
        self.add_select(expr)
    }

    /// SELECT DISTINCT.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== JOIN ====================

    /// Add INNER JOIN.
    pub fn inner_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses.push(format!("INNER JOIN {table} ON {on}"));
        self
    }

    /// Add LEFT JOIN.
    pub fn left_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses.push(format!("LEFT JOIN {table} ON {on}"));
        self
    }

    /// Add RIGHT JOIN.
    pub fn right_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses.push(format!("RIGHT JOIN {table} ON {on}"));
        self
    }

    /// Add FULL OUTER JOIN.
    pub fn full_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses
            .push(format!("FULL OUTER JOIN {table} ON {on}"));
        self
    }

    // ==================== WHERE: explicit operator ====================

    /// Add WHERE: column op value, with the operator validated against the
    /// allowlist. An unknown operator is a build error reported before
    /// execution.
    pub fn where_op<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        op: &str,
        value: T,
    ) -> Self {
        match check_operator(op) {
            Some(op) => self.wheres.and(Clause::compare(column, op, value)),
            None => self.record_error(format!("unsupported operator: {op:?}")),
        }
        self
    }

    /// Add OR WHERE: column op value.
    pub fn or_where_op<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        op: &str,
        value: T,
    ) -> Self {
        match check_operator(op) {
            Some(op) => self.wheres.or(Clause::compare(column, op, value)),
            None => self.record_error(format!("unsupported operator: {op:?}")),
        }
        self
    }

    // ==================== WHERE: shorthands ====================

    /// Add WHERE: column = value
    pub fn eq<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.wheres.eq(column, value);
        self
    }

    /// Add OR WHERE: column = value
    pub fn or_eq<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.wheres.or_eq(column, value);
        self
    }

    /// Add WHERE: column != value
    pub fn ne<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.wheres.ne(column, value);
        self
    }

    /// Add WHERE: column > value
    pub fn gt<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.wheres.gt(column, value);
        self
    }

    /// Add WHERE: column >= value
    pub fn gte<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.wheres.gte(column, value);
        self
    }

    /// Add WHERE: column < value
    pub fn lt<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.wheres.lt(column, value);
        self
    }

    /// Add WHERE: column <= value
    pub fn lte<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.wheres.lte(column, value);
        self
    }

    /// Add WHERE: column LIKE pattern
    pub fn like<T: ToSql + Send + Sync + 'static>(mut self, column: &str, pattern: T) -> Self {
        self.wheres.like(column, pattern);
        self
    }

    /// Add WHERE: column ILIKE pattern (case-insensitive)
    pub fn ilike<T: ToSql + Send + Sync + 'static>(mut self, column: &str, pattern: T) -> Self {
        self.wheres.ilike(column, pattern);
        self
    }

    /// Add WHERE: column NOT LIKE pattern
    pub fn not_like<T: ToSql + Send + Sync + 'static>(mut self, column: &str, pattern: T) -> Self {
        self.wheres.not_like(column, pattern);
        self
    }

    /// Add WHERE: column IS NULL
    pub fn is_null(mut self, column: &str) -> Self {
        self.wheres.is_null(column);
        self
    }

    /// Add WHERE: column IS NOT NULL
    pub fn is_not_null(mut self, column: &str) -> Self {
        self.wheres.is_not_null(column);
        self
    }

    /// Add WHERE: column IN (values...). Empty input compiles to an
    /// always-false predicate.
    pub fn in_list<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        values: Vec<T>,
    ) -> Self {
        self.wheres.in_list(column, values);
        self
    }

    /// Add WHERE: column NOT IN (values...). Empty input compiles to an
    /// always-true predicate.
    pub fn not_in<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        values: Vec<T>,
    ) -> Self {
        self.wheres.not_in(column, values);
        self
    }

    /// Add WHERE: column BETWEEN from AND to
    pub fn between<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        from: T,
        to: T,
    ) -> Self {
        self.wheres.between(column, from, to);
        self
    }

    /// Add WHERE: column NOT BETWEEN from AND to
    pub fn not_between<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        from: T,
        to: T,
    ) -> Self {
        self.wheres.not_between(column, from, to);
        self
    }

    /// Add a raw WHERE condition without bindings.
    pub fn where_raw(mut self, sql: &str) -> Self {
        self.wheres.raw(sql);
        self
    }

    /// Add a WHERE condition with `?` placeholders.
    pub fn where_template<T: ToSql + Send + Sync + 'static>(
        mut self,
        sql: &str,
        values: Vec<T>,
    ) -> Self {
        self.wheres.template(sql, values);
        self
    }

    // ==================== WHERE: date parts ====================

    /// Add WHERE: the date part of column equals the given date.
    pub fn where_date(self, column: &str, value: NaiveDate) -> Self {
        self.where_date_op(column, "=", value)
    }

    /// Add WHERE: the date part of column compares to the given date.
    pub fn where_date_op(mut self, column: &str, op: &str, value: NaiveDate) -> Self {
        self.push_date_part(DatePart::Date, column, op, value);
        self
    }

    /// Add WHERE: the month of column equals the given month (1-12).
    pub fn where_month(self, column: &str, value: i32) -> Self {
        self.where_month_op(column, "=", value)
    }

    /// Add WHERE: the month of column compares to the given month.
    pub fn where_month_op(mut self, column: &str, op: &str, value: i32) -> Self {
        self.push_date_part(DatePart::Month, column, op, value);
        self
    }

    /// Add WHERE: the year of column equals the given year.
    pub fn where_year(self, column: &str, value: i32) -> Self {
        self.where_year_op(column, "=", value)
    }

    /// Add WHERE: the year of column compares to the given year.
    pub fn where_year_op(mut self, column: &str, op: &str, value: i32) -> Self {
        self.push_date_part(DatePart::Year, column, op, value);
        self
    }

    /// Add WHERE: the time part of column equals the given time.
    pub fn where_time(self, column: &str, value: NaiveTime) -> Self {
        self.where_time_op(column, "=", value)
    }

    /// Add WHERE: the time part of column compares to the given time.
    pub fn where_time_op(mut self, column: &str, op: &str, value: NaiveTime) -> Self {
        self.push_date_part(DatePart::Time, column, op, value);
        self
    }

    fn push_date_part<T: ToSql + Send + Sync + 'static>(
        &mut self,
        part: DatePart,
        column: &str,
        op: &str,
        value: T,
    ) {
        match check_operator(op) {
            Some(op) => self.wheres.and(Clause::DatePart {
                part,
                column: column.to_string(),
                op,
                value: Binding::new(value),
            }),
            None => self.record_error(format!("unsupported operator: {op:?}")),
        }
    }

    // ==================== WHERE: columns and subqueries ====================

    /// Add WHERE: left op right, comparing two columns with no binding.
    pub fn where_column(mut self, left: &str, op: &str, right: &str) -> Self {
        match check_operator(op) {
            Some(op) => self.wheres.and(Clause::ColumnCompare {
                left: left.to_string(),
                op,
                right: right.to_string(),
            }),
            None => self.record_error(format!("unsupported operator: {op:?}")),
        }
        self
    }

    /// Add WHERE: left = right, comparing two columns.
    pub fn where_column_eq(self, left: &str, right: &str) -> Self {
        self.where_column(left, "=", right)
    }

    /// Add WHERE EXISTS (subquery). Correlate via [`Self::where_column`] in
    /// the subquery.
    ///
    /// # Example
    /// ```ignore
    /// let qb = table("users").where_exists(
    ///     table("orders").where_column_eq("orders.user_id", "users.id"),
    /// );
    /// ```
    pub fn where_exists(mut self, subquery: QueryBuilder) -> Self {
        // Misuse recorded inside the subquery must fail the outer query too.
        if let Some(err) = subquery.build_error.clone() {
            self.record_error(err);
        }
        self.wheres.and(Clause::Exists {
            query: Box::new(subquery),
            negated: false,
        });
        self
    }

    /// Add WHERE NOT EXISTS (subquery).
    pub fn where_not_exists(mut self, subquery: QueryBuilder) -> Self {
        if let Some(err) = subquery.build_error.clone() {
            self.record_error(err);
        }
        self.wheres.and(Clause::Exists {
            query: Box::new(subquery),
            negated: true,
        });
        self
    }

    // ==================== WHERE: grouping ====================

    /// Add a parenthesized AND-connected group built by the closure.
    ///
    /// # Example
    /// ```ignore
    /// let qb = table("users").eq("status", "active").and_group(|g| {
    ///     g.eq("role", "admin");
    ///     g.or_eq("role", "superuser");
    /// });
    /// // WHERE status = $1 AND (role = $2 OR role = $3)
    /// ```
    pub fn and_group(mut self, f: impl FnOnce(&mut ClauseGroup)) -> Self {
        let mut group = ClauseGroup::new();
        f(&mut group);
        if !group.is_empty() {
            self.wheres.and(Clause::Group(group));
        }
        self
    }

    /// Add a parenthesized OR-connected group built by the closure.
    pub fn or_group(mut self, f: impl FnOnce(&mut ClauseGroup)) -> Self {
        let mut group = ClauseGroup::new();
        f(&mut group);
        if !group.is_empty() {
            self.wheres.or(Clause::Group(group));
        }
        self
    }

    /// Add a custom clause (AND-connected).
    pub fn and_clause(mut self, clause: Clause) -> Self {
        self.wheres.and(clause);
        self
    }

    /// Add a custom clause (OR-connected).
    pub fn or_clause(mut self, clause: Clause) -> Self {
        self.wheres.or(clause);
        self
    }

    // ==================== Conditional chaining ====================

    /// Apply the callback only when `condition` is true.
    ///
    /// # Example
    /// ```ignore
    /// let qb = table("users").when(want_sorted, |q| q.order_by_asc("name"));
    /// ```
    pub fn when(self, condition: bool, f: impl FnOnce(Self) -> Self) -> Self {
        if condition { f(self) } else { self }
    }

    /// Apply `f` when `condition` is true, otherwise `otherwise`.
    pub fn when_else(
        self,
        condition: bool,
        f: impl FnOnce(Self) -> Self,
        otherwise: impl FnOnce(Self) -> Self,
    ) -> Self {
        if condition { f(self) } else { otherwise(self) }
    }

    // ==================== Optional value helpers ====================

    /// Add WHERE if value is Some: column = value
    pub fn eq_opt<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        value: Option<T>,
    ) -> Self {
        if let Some(v) = value {
            self.wheres.eq(column, v);
        }
        self
    }

    /// Add WHERE if value is Some: column LIKE pattern
    pub fn like_opt<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        pattern: Option<T>,
    ) -> Self {
        if let Some(v) = pattern {
            self.wheres.like(column, v);
        }
        self
    }

    /// Add WHERE if values is Some and non-empty: column IN (values...)
    pub fn in_opt<T: ToSql + Send + Sync + 'static>(
        mut self,
        column: &str,
        values: Option<Vec<T>>,
    ) -> Self {
        if let Some(v) = values
            && !v.is_empty()
        {
            self.wheres.in_list(column, v);
        }
        self
    }

    // ==================== Grouping / ordering ====================

    /// Add a GROUP BY column.
    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    /// Add HAVING: expr op value, with the operator validated.
    pub fn having_op<T: ToSql + Send + Sync + 'static>(
        mut self,
        expr: &str,
        op: &str,
        value: T,
    ) -> Self {
        match check_operator(op) {
            Some(op) => self.havings.and(Clause::compare(expr, op, value)),
            None => self.record_error(format!("unsupported operator: {op:?}")),
        }
        self
    }

    /// Add HAVING: expr = value
    pub fn having_eq<T: ToSql + Send + Sync + 'static>(mut self, expr: &str, value: T) -> Self {
        self.havings.eq(expr, value);
        self
    }

    /// Add HAVING: expr > value
    pub fn having_gt<T: ToSql + Send + Sync + 'static>(mut self, expr: &str, value: T) -> Self {
        self.havings.gt(expr, value);
        self
    }

    /// Add HAVING: expr >= value
    pub fn having_gte<T: ToSql + Send + Sync + 'static>(mut self, expr: &str, value: T) -> Self {
        self.havings.gte(expr, value);
        self
    }

    /// Add HAVING: expr < value
    pub fn having_lt<T: ToSql + Send + Sync + 'static>(mut self, expr: &str, value: T) -> Self {
        self.havings.lt(expr, value);
        self
    }

    /// Add HAVING: expr <= value
    pub fn having_lte<T: ToSql + Send + Sync + 'static>(mut self, expr: &str, value: T) -> Self {
        self.havings.lte(expr, value);
        self
    }

    /// Add ORDER BY clause (free-form, e.g. "created_at DESC NULLS LAST").
    pub fn order_by(mut self, clause: &str) -> Self {
        self.order_clauses.push(clause.to_string());
        self
    }

    /// Add ORDER BY column ASC.
    pub fn order_by_asc(mut self, column: &str) -> Self {
        self.order_clauses.push(format!("{column} ASC"));
        self
    }

    /// Add ORDER BY column DESC.
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_clauses.push(format!("{column} DESC"));
        self
    }

    // ==================== Pagination ====================

    /// Set LIMIT.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Pagination helper: `paginate(p, n)` is `offset((p-1)*n).limit(n)`.
    ///
    /// `page` is 1-based (clamped to >= 1). `per_page` is clamped to >= 1.
    pub fn paginate(mut self, page: i64, per_page: i64) -> Self {
        let p = page.max(1);
        let size = per_page.max(1);
        self.limit = Some(size);
        self.offset = Some((p - 1) * size);
        self
    }

    /// Set page (1-based), using the current LIMIT as the page size.
    /// When no LIMIT is set, the page size defaults to 10.
    pub fn page(mut self, page: i64) -> Self {
        let p = page.max(1);
        let per_page = self.limit.unwrap_or(10);
        self.offset = Some((p - 1) * per_page);
        self
    }

    /// Set items per page.
    pub fn per_page(mut self, per_page: i64) -> Self {
        self.limit = Some(per_page.max(1));
        self
    }

    // ==================== Mutation payload ====================

    /// Set a column value for INSERT/UPDATE.
    pub fn set<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.set_fields
            .push((column.to_string(), SetValue::Value(Binding::new(value))));
        self
    }

    /// Set an optional column value (None => skip).
    pub fn set_opt<T: ToSql + Send + Sync + 'static>(
        self,
        column: &str,
        value: Option<T>,
    ) -> Self {
        if let Some(v) = value { self.set(column, v) } else { self }
    }

    /// Set a JSON column from any serializable value.
    pub fn set_json<T: serde::Serialize>(mut self, column: &str, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => self = self.set(column, json),
            Err(e) => self.record_error(format!("set_json({column}): {e}")),
        }
        self
    }

    /// Set a raw SQL expression (no bindings), e.g. `NOW()`.
    pub fn set_raw(mut self, column: &str, expr: &str) -> Self {
        self.set_fields
            .push((column.to_string(), SetValue::Raw(expr.to_string())));
        self
    }

    /// Allow DELETE without WHERE conditions.
    ///
    /// By default, DELETE without WHERE generates `WHERE 1=0` (no-op).
    pub fn allow_delete_all(mut self, allow: bool) -> Self {
        self.allow_delete_all = allow;
        self
    }

    // ==================== Compile surface ====================

    /// Fail fast on builder misuse recorded during chaining.
    pub fn validate(&self) -> DbResult<()> {
        if let Some(ref err) = self.build_error {
            return Err(DbError::Validation(err.clone()));
        }
        Ok(())
    }

    /// Get the compiled SELECT SQL (for inspection).
    pub fn to_sql(&self) -> String {
        let mut bindings = Bindings::new();
        grammar::compile_select(self, &mut bindings)
    }

    /// Get the compiled SELECT SQL together with its binding list.
    pub fn to_sql_bindings(&self) -> (String, Bindings) {
        let mut bindings = Bindings::new();
        let sql = grammar::compile_select(self, &mut bindings);
        (sql, bindings)
    }

    /// Get the compiled COUNT SQL (for inspection).
    pub fn to_count_sql(&self) -> String {
        let mut bindings = Bindings::new();
        grammar::compile_count(self, &mut bindings)
    }

    /// Get the compiled UPDATE SQL (for inspection).
    pub fn to_update_sql(&self) -> String {
        let mut bindings = Bindings::new();
        grammar::compile_update(self, &mut bindings)
    }

    /// Get the compiled DELETE SQL (for inspection).
    pub fn to_delete_sql(&self) -> String {
        let mut bindings = Bindings::new();
        grammar::compile_delete(self, &mut bindings)
    }

    /// Get the compiled single-row INSERT SQL (for inspection).
    pub fn to_insert_sql(&self) -> String {
        let mut bindings = Bindings::new();
        grammar::compile_insert(self, None, &mut bindings)
    }

    // ==================== Read terminals ====================

    /// Execute the SELECT and return all rows. An empty result set is an
    /// empty vector, not an error.
    pub async fn get(&self, conn: &impl Executor) -> DbResult<Vec<Row>> {
        self.validate()?;
        let mut bindings = Bindings::new();
        let sql = grammar::compile_select(self, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "select");
        conn.query(&sql, &bindings.as_refs()).await
    }

    /// Execute the SELECT and map all rows to `T`.
    pub async fn fetch_all<T: FromRow>(&self, conn: &impl Executor) -> DbResult<Vec<T>> {
        let rows = self.get(conn).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// Execute the SELECT and return the first row, if any.
    pub async fn first(&self, conn: &impl Executor) -> DbResult<Option<Row>> {
        self.validate()?;
        let mut bindings = Bindings::new();
        let sql = grammar::compile_select(self, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "select first");
        conn.query_opt(&sql, &bindings.as_refs()).await
    }

    /// Execute the SELECT and map the first row to `T`, if any.
    pub async fn fetch_first<T: FromRow>(&self, conn: &impl Executor) -> DbResult<Option<T>> {
        let row = self.first(conn).await?;
        row.as_ref().map(T::from_row).transpose()
    }

    /// Fetch a single row by primary key, or `None` when absent.
    pub async fn find<T: ToSql + Send + Sync + 'static>(
        &self,
        conn: &impl Executor,
        id: T,
    ) -> DbResult<Option<Row>> {
        let pk = self.primary_key.clone();
        self.clone().eq(&pk, id).limit(1).first(conn).await
    }

    /// Fetch a single record by primary key, mapped to `T`.
    pub async fn fetch_find<R: FromRow, T: ToSql + Send + Sync + 'static>(
        &self,
        conn: &impl Executor,
        id: T,
    ) -> DbResult<Option<R>> {
        let row = self.find(conn, id).await?;
        row.as_ref().map(R::from_row).transpose()
    }

    // ==================== Aggregates ====================

    /// Execute COUNT(*) for the current query.
    pub async fn count(&self, conn: &impl Executor) -> DbResult<i64> {
        self.validate()?;
        let mut bindings = Bindings::new();
        let sql = grammar::compile_count(self, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "count");
        let row = conn.query_one(&sql, &bindings.as_refs()).await?;
        row.try_get(0)
            .map_err(|e| DbError::decode("count", e.to_string()))
    }

    /// Execute SUM(column). Returns `None` on an empty/all-NULL set.
    pub async fn sum<T>(&self, conn: &impl Executor, column: &str) -> DbResult<Option<T>>
    where
        T: for<'a> FromSql<'a>,
    {
        self.aggregate(conn, "SUM", column).await
    }

    /// Execute AVG(column). Returns `None` on an empty/all-NULL set.
    pub async fn avg<T>(&self, conn: &impl Executor, column: &str) -> DbResult<Option<T>>
    where
        T: for<'a> FromSql<'a>,
    {
        self.aggregate(conn, "AVG", column).await
    }

    /// Execute MAX(column). Returns `None` on an empty set.
    pub async fn max<T>(&self, conn: &impl Executor, column: &str) -> DbResult<Option<T>>
    where
        T: for<'a> FromSql<'a>,
    {
        self.aggregate(conn, "MAX", column).await
    }

    /// Execute MIN(column). Returns `None` on an empty set.
    pub async fn min<T>(&self, conn: &impl Executor, column: &str) -> DbResult<Option<T>>
    where
        T: for<'a> FromSql<'a>,
    {
        self.aggregate(conn, "MIN", column).await
    }

    async fn aggregate<T>(
        &self,
        conn: &impl Executor,
        func: &str,
        column: &str,
    ) -> DbResult<Option<T>>
    where
        T: for<'a> FromSql<'a>,
    {
        self.validate()?;
        let mut bindings = Bindings::new();
        let sql = grammar::compile_aggregate(self, func, column, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "aggregate");
        let row = conn.query_one(&sql, &bindings.as_refs()).await?;
        row.try_get(0)
            .map_err(|e| DbError::decode(column, e.to_string()))
    }

    /// Check whether any row matches the current query.
    pub async fn exists(&self, conn: &impl Executor) -> DbResult<bool> {
        self.validate()?;
        let mut bindings = Bindings::new();
        let sql = grammar::compile_exists(self, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "exists");
        let row = conn.query_one(&sql, &bindings.as_refs()).await?;
        row.try_get(0)
            .map_err(|e| DbError::decode("exists", e.to_string()))
    }

    // ==================== Chunking ====================

    /// Page through the result set, invoking the callback once per non-empty
    /// page. When no ORDER BY is set, rows are ordered by the primary key so
    /// pages are stable. The callback returns `Ok(false)` to stop early.
    ///
    /// Rows mutated by the callback's own writes may shift between pages;
    /// that is the caller's responsibility, not the builder's.
    pub async fn chunk<C, F, Fut>(&self, conn: &C, size: i64, mut callback: F) -> DbResult<()>
    where
        C: Executor,
        F: FnMut(Vec<Row>) -> Fut,
        Fut: Future<Output = DbResult<bool>>,
    {
        if size <= 0 {
            return Err(DbError::validation("chunk size must be positive"));
        }
        let mut base = self.clone();
        if base.order_clauses.is_empty() {
            let pk = base.primary_key.clone();
            base = base.order_by_asc(&pk);
        }

        let mut page = 1i64;
        loop {
            let rows = base.clone().paginate(page, size).get(conn).await?;
            if rows.is_empty() {
                break;
            }
            let fetched = rows.len() as i64;
            if !callback(rows).await? {
                break;
            }
            if fetched < size {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    // ==================== Write terminals ====================

    /// Insert one row from the staged SET fields. With no SET fields this
    /// compiles to `INSERT INTO t DEFAULT VALUES`.
    pub async fn insert(&self, conn: &impl Executor) -> DbResult<u64> {
        self.validate()?;
        let mut bindings = Bindings::new();
        let sql = grammar::compile_insert(self, None, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "insert");
        conn.execute(&sql, &bindings.as_refs()).await
    }

    /// Insert one row and return the generated primary key via RETURNING.
    pub async fn insert_get_id<T>(&self, conn: &impl Executor) -> DbResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.validate()?;
        let mut bindings = Bindings::new();
        let sql = grammar::compile_insert(self, Some(&self.primary_key), &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "insert returning id");
        let row = conn.query_one(&sql, &bindings.as_refs()).await?;
        row.try_get(0)
            .map_err(|e| DbError::decode(&self.primary_key, e.to_string()))
    }

    /// Insert multiple rows in one statement. Every row must match the
    /// column list length; zero rows is a no-op returning 0.
    pub async fn insert_many(
        &self,
        conn: &impl Executor,
        columns: &[&str],
        rows: Vec<Vec<Binding>>,
    ) -> DbResult<u64> {
        self.validate()?;
        if rows.is_empty() {
            return Ok(0);
        }
        if columns.is_empty() {
            return Err(DbError::validation("insert_many: column list is empty"));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DbError::Validation(format!(
                    "insert_many: row {} has {} values, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }
        let mut bindings = Bindings::new();
        let sql = grammar::compile_insert_many(&self.table, columns, &rows, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "insert many");
        conn.execute(&sql, &bindings.as_refs()).await
    }

    /// Execute UPDATE with the staged SET fields and accumulated WHERE
    /// clauses, returning the affected row count. An empty SET list is a
    /// validation error.
    pub async fn update(&self, conn: &impl Executor) -> DbResult<u64> {
        self.validate()?;
        if self.set_fields.is_empty() {
            return Err(DbError::validation("update: SET clause cannot be empty"));
        }
        let mut bindings = Bindings::new();
        let sql = grammar::compile_update(self, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "update");
        conn.execute(&sql, &bindings.as_refs()).await
    }

    /// Execute DELETE with the accumulated WHERE clauses, returning the
    /// affected row count. Without WHERE this is a no-op unless
    /// [`Self::allow_delete_all`] was called.
    pub async fn delete(&self, conn: &impl Executor) -> DbResult<u64> {
        self.validate()?;
        let mut bindings = Bindings::new();
        let sql = grammar::compile_delete(self, &mut bindings);
        tracing::debug!(target: "fluentpg::sql", sql = %sql, bindings = bindings.len(), "delete");
        conn.execute(&sql, &bindings.as_refs()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_select() {
        let qb = table("users");
        assert_eq!(qb.to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn select_with_columns() {
        let qb = table("users").select("id, name, email");
        assert_eq!(qb.to_sql(), "SELECT id, name, email FROM users");
    }

    #[test]
    fn select_distinct() {
        let qb = table("users").select("email").distinct();
        assert_eq!(qb.to_sql(), "SELECT DISTINCT email FROM users");
    }

    #[test]
    fn where_chain_renders_in_order() {
        let qb = table("users").eq("status", "active").gt("age", 18i32);
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE status = $1 AND age > $2"
        );
    }

    #[test]
    fn or_where() {
        let qb = table("users").eq("role", "admin").or_eq("role", "owner");
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE role = $1 OR role = $2"
        );
    }

    #[test]
    fn where_op_defaults_validated() {
        let qb = table("users").where_op("age", ">=", 21i32);
        assert_eq!(qb.to_sql(), "SELECT * FROM users WHERE age >= $1");
    }

    #[test]
    fn where_op_rejects_unknown_operator() {
        let qb = table("users").where_op("age", "=ANY", 21i32);
        assert!(qb.validate().is_err());
    }

    #[test]
    fn grouped_wheres() {
        let qb = table("users").eq("status", "active").and_group(|g| {
            g.eq("role", "admin");
            g.or_eq("role", "superuser");
        });
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE status = $1 AND (role = $2 OR role = $3)"
        );
    }

    #[test]
    fn or_group_connector() {
        let qb = table("users").eq("banned", false).or_group(|g| {
            g.eq("role", "admin");
            g.gt("age", 65i32);
        });
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE banned = $1 OR (role = $2 AND age > $3)"
        );
    }

    #[test]
    fn join_and_where() {
        let qb = table("users u")
            .inner_join("orders o", "u.id = o.user_id")
            .eq("u.status", "active");
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users u INNER JOIN orders o ON u.id = o.user_id WHERE u.status = $1"
        );
    }

    #[test]
    fn order_limit_offset() {
        let qb = table("users")
            .order_by("created_at DESC")
            .limit(10)
            .offset(20);
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users ORDER BY created_at DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn paginate_matches_offset_limit() {
        for (page, per_page) in [(1i64, 10i64), (2, 10), (3, 25), (7, 100)] {
            let a = table("users").paginate(page, per_page).to_sql();
            let b = table("users")
                .offset((page - 1) * per_page)
                .limit(per_page)
                .to_sql();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn page_uses_current_limit() {
        let qb = table("users").limit(25).page(3);
        assert_eq!(qb.to_sql(), "SELECT * FROM users LIMIT 25 OFFSET 50");
    }

    #[test]
    fn page_without_limit_defaults_to_ten() {
        let qb = table("users").page(3);
        assert_eq!(qb.to_sql(), "SELECT * FROM users OFFSET 20");
    }

    #[test]
    fn in_list_and_empty_in_list() {
        let qb = table("users").in_list("id", vec![1i64, 2, 3]);
        assert_eq!(qb.to_sql(), "SELECT * FROM users WHERE id IN ($1, $2, $3)");

        let qb = table("users").in_list::<i64>("id", vec![]);
        assert_eq!(qb.to_sql(), "SELECT * FROM users WHERE 1=0");

        let qb = table("users").not_in::<i64>("id", vec![]);
        assert_eq!(qb.to_sql(), "SELECT * FROM users WHERE 1=1");
    }

    #[test]
    fn null_checks() {
        let qb = table("users").is_null("deleted_at").is_not_null("email");
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE deleted_at IS NULL AND email IS NOT NULL"
        );
    }

    #[test]
    fn date_part_wheres() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let qb = table("orders").where_date("created_at", day);
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM orders WHERE created_at::date = $1"
        );

        let qb = table("orders").where_year("created_at", 2024).where_month("created_at", 6);
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM orders WHERE EXTRACT(YEAR FROM created_at)::int = $1 \
             AND EXTRACT(MONTH FROM created_at)::int = $2"
        );
        // Both bindings stay plain ints; the cast keeps them valid against
        // the numeric EXTRACT result.
        let (_, bindings) = qb.to_sql_bindings();
        assert_eq!(bindings.describe(), vec!["2024", "6"]);
    }

    #[test]
    fn where_exists_subquery_shares_numbering() {
        let qb = table("users").eq("status", "active").where_exists(
            table("orders")
                .select("1")
                .where_column_eq("orders.user_id", "users.id")
                .eq("orders.paid", true),
        );
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE status = $1 AND EXISTS \
             (SELECT 1 FROM orders WHERE orders.user_id = users.id AND orders.paid = $2)"
        );
        let (_, bindings) = qb.to_sql_bindings();
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn subquery_build_error_fails_outer_validation() {
        let qb = table("users").where_exists(
            table("orders")
                .select("1")
                .where_op("status", "BOGUS OP", 1i32),
        );
        assert!(qb.validate().is_err());

        let qb = table("users").where_not_exists(
            table("orders")
                .select("1")
                .where_op("status", "BOGUS OP", 1i32),
        );
        assert!(qb.validate().is_err());
    }

    #[test]
    fn where_not_exists() {
        let qb = table("users").where_not_exists(
            table("bans").select("1").where_column_eq("bans.user_id", "users.id"),
        );
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE NOT EXISTS \
             (SELECT 1 FROM bans WHERE bans.user_id = users.id)"
        );
    }

    #[test]
    fn when_applies_conditionally() {
        let qb = table("users")
            .when(true, |q| q.eq("status", "active"))
            .when(false, |q| q.eq("role", "admin"));
        assert_eq!(qb.to_sql(), "SELECT * FROM users WHERE status = $1");
    }

    #[test]
    fn when_else_takes_other_branch() {
        let qb = table("users").when_else(
            false,
            |q| q.order_by_asc("name"),
            |q| q.order_by_desc("created_at"),
        );
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users ORDER BY created_at DESC"
        );
    }

    #[test]
    fn optional_conditions() {
        let status: Option<&str> = Some("active");
        let name: Option<&str> = None;
        let qb = table("users").eq_opt("status", status).eq_opt("name", name);
        assert_eq!(qb.to_sql(), "SELECT * FROM users WHERE status = $1");
    }

    #[test]
    fn group_by_having() {
        let qb = table("orders")
            .select("user_id, COUNT(*) AS order_count")
            .group_by("user_id")
            .having_gt("COUNT(*)", 5i64);
        assert_eq!(
            qb.to_sql(),
            "SELECT user_id, COUNT(*) AS order_count FROM orders \
             GROUP BY user_id HAVING COUNT(*) > $1"
        );
    }

    #[test]
    fn count_sql() {
        let qb = table("users").eq("status", "active");
        assert_eq!(
            qb.to_count_sql(),
            "SELECT COUNT(*) FROM users WHERE status = $1"
        );
    }

    #[test]
    fn count_with_group_by_wraps_subquery() {
        let qb = table("orders").group_by("user_id").having_gt("COUNT(*)", 5i64);
        let sql = qb.to_count_sql();
        assert!(sql.starts_with("SELECT COUNT(*) FROM ("));
        assert!(sql.contains("GROUP BY user_id"));
    }

    #[test]
    fn update_sql_numbers_set_before_where() {
        let qb = table("users")
            .set("name", "Alice")
            .set("email", "alice@example.com")
            .eq("id", 1i64);
        assert_eq!(
            qb.to_update_sql(),
            "UPDATE users SET name = $1, email = $2 WHERE id = $3"
        );
    }

    #[test]
    fn update_with_raw_set() {
        let qb = table("users").set_raw("updated_at", "NOW()").eq("id", 1i64);
        assert_eq!(
            qb.to_update_sql(),
            "UPDATE users SET updated_at = NOW() WHERE id = $1"
        );
    }

    #[test]
    fn delete_without_where_is_noop() {
        let qb = table("users");
        assert_eq!(qb.to_delete_sql(), "DELETE FROM users WHERE 1=0");

        let qb = table("users").allow_delete_all(true);
        assert_eq!(qb.to_delete_sql(), "DELETE FROM users");
    }

    #[test]
    fn delete_with_where() {
        let qb = table("users").eq("id", 1i64);
        assert_eq!(qb.to_delete_sql(), "DELETE FROM users WHERE id = $1");
    }

    #[test]
    fn insert_sql() {
        let qb = table("users")
            .set("username", "alice")
            .set("email", "alice@example.com");
        assert_eq!(
            qb.to_insert_sql(),
            "INSERT INTO users (username, email) VALUES ($1, $2)"
        );
    }

    #[test]
    fn insert_default_values() {
        let qb = table("audit_log");
        assert_eq!(qb.to_insert_sql(), "INSERT INTO audit_log DEFAULT VALUES");
    }

    #[test]
    fn single_where_has_one_placeholder_and_binding() {
        let (sql, bindings) = table("users").eq("status", "active").to_sql_bindings();
        assert_eq!(sql.matches('$').count(), 1);
        assert_eq!(bindings.len(), 1);
        assert!(bindings.describe()[0].contains("active"));
    }

    #[test]
    fn where_template_renumbers() {
        let qb = table("users")
            .eq("status", "active")
            .where_template("(a = ? OR b = ?)", vec![1i32, 2i32]);
        assert_eq!(
            qb.to_sql(),
            "SELECT * FROM users WHERE status = $1 AND (a = $2 OR b = $3)"
        );
    }
}
