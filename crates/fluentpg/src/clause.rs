//! The WHERE/HAVING clause tree.
//!
//! [`Clause`] is a tagged variant tree covering comparisons, NULL checks,
//! IN lists, BETWEEN ranges, date-part comparisons, column-to-column
//! comparisons, correlated EXISTS subqueries, templates, and raw fragments.
//! [`ClauseGroup`] holds an ordered sequence of clauses together with their
//! AND/OR connectors.
//!
//! Placeholder indices (`$n`) are computed at build time by pushing values
//! onto a shared [`Bindings`] list. User values are never spliced into the
//! SQL text.

use crate::binding::{Binding, Bindings};
use crate::builder::QueryBuilder;
use tokio_postgres::types::ToSql;

/// Boolean connector between adjacent clauses in a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    fn keyword(self) -> &'static str {
        match self {
            Connector::And => " AND ",
            Connector::Or => " OR ",
        }
    }
}

/// Date part selector for date/time comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatePart {
    Date,
    Month,
    Year,
    Time,
}

/// Validate a comparison operator against the allowlist.
///
/// Returns the canonical (uppercased) operator, or `None` for anything that
/// is not a plain comparison or pattern-match operator. Rejecting unknown
/// operators here is what keeps arbitrary SQL out of the operator position.
pub fn check_operator(op: &str) -> Option<&'static str> {
    match op.trim().to_ascii_uppercase().as_str() {
        "=" => Some("="),
        "!=" => Some("!="),
        "<>" => Some("<>"),
        "<" => Some("<"),
        "<=" => Some("<="),
        ">" => Some(">"),
        ">=" => Some(">="),
        "LIKE" => Some("LIKE"),
        "ILIKE" => Some("ILIKE"),
        "NOT LIKE" => Some("NOT LIKE"),
        "NOT ILIKE" => Some("NOT ILIKE"),
        _ => None,
    }
}

/// One filter condition contributing to a WHERE or HAVING expression.
#[derive(Clone, Debug)]
pub enum Clause {
    /// Simple comparison: column op $n
    Compare {
        column: String,
        op: &'static str,
        value: Binding,
    },

    /// NULL check: column IS NULL or column IS NOT NULL
    Null { column: String, negated: bool },

    /// IN list: column IN ($1, $2, ...) or column NOT IN (...)
    In {
        column: String,
        values: Vec<Binding>,
        negated: bool,
    },

    /// BETWEEN: column [NOT] BETWEEN $n AND $m
    Between {
        column: String,
        from: Binding,
        to: Binding,
        negated: bool,
    },

    /// Date-part comparison: `col::date op $n` / `EXTRACT(YEAR FROM col)::int op $n`
    DatePart {
        part: DatePart,
        column: String,
        op: &'static str,
        value: Binding,
    },

    /// Column-to-column comparison, no binding: `a op b`
    ColumnCompare {
        left: String,
        op: &'static str,
        right: String,
    },

    /// Correlated subquery: [NOT] EXISTS (SELECT ...)
    ///
    /// The subquery shares the outer binding list, so its placeholders are
    /// numbered after everything compiled before it.
    Exists {
        query: Box<QueryBuilder>,
        negated: bool,
    },

    /// Template with `?` placeholders renumbered to `$n` at build time.
    /// Example: `Template { sql: "a = ? OR b = ?", params: [1, 2] }` -> `a = $1 OR b = $2`
    Template { sql: String, params: Vec<Binding> },

    /// Raw SQL fragment without bindings. Caller responsibility.
    Raw(String),

    /// Parenthesized nested group.
    Group(ClauseGroup),

    /// Always true (empty NOT IN lists).
    True,

    /// Always false (empty IN lists).
    False,
}

impl Clause {
    /// Create a comparison clause: column op value.
    ///
    /// `op` must already be canonical (see [`check_operator`]).
    pub fn compare<T: ToSql + Send + Sync + 'static>(
        column: impl Into<String>,
        op: &'static str,
        value: T,
    ) -> Self {
        Clause::Compare {
            column: column.into(),
            op,
            value: Binding::new(value),
        }
    }

    /// Create an IN condition. Empty input resolves to an always-false
    /// predicate rather than erroring.
    pub fn in_list<T: ToSql + Send + Sync + 'static>(
        column: impl Into<String>,
        values: Vec<T>,
    ) -> Self {
        if values.is_empty() {
            return Clause::False;
        }
        Clause::In {
            column: column.into(),
            values: values.into_iter().map(Binding::new).collect(),
            negated: false,
        }
    }

    /// Create a NOT IN condition. Empty input resolves to always-true.
    pub fn not_in<T: ToSql + Send + Sync + 'static>(
        column: impl Into<String>,
        values: Vec<T>,
    ) -> Self {
        if values.is_empty() {
            return Clause::True;
        }
        Clause::In {
            column: column.into(),
            values: values.into_iter().map(Binding::new).collect(),
            negated: true,
        }
    }

    /// Create a raw SQL fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        Clause::Raw(sql.into())
    }

    /// Create a template clause with `?` placeholders.
    pub fn template<T: ToSql + Send + Sync + 'static>(
        sql: impl Into<String>,
        values: Vec<T>,
    ) -> Self {
        Clause::Template {
            sql: sql.into(),
            params: values.into_iter().map(Binding::new).collect(),
        }
    }

    /// Check if this clause renders to nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Clause::Group(group) => group.is_empty(),
            _ => false,
        }
    }

    /// Render the SQL fragment, pushing values onto the shared binding list.
    pub fn build(&self, bindings: &mut Bindings) -> String {
        match self {
            Clause::Compare { column, op, value } => {
                let idx = bindings.push_binding(value.clone());
                format!("{column} {op} ${idx}")
            }
            Clause::Null { column, negated } => {
                if *negated {
                    format!("{column} IS NOT NULL")
                } else {
                    format!("{column} IS NULL")
                }
            }
            Clause::In {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // Constructors return True/False for empty input; this
                    // arm only matters for hand-built clauses.
                    return if *negated { "1=1".into() } else { "1=0".into() };
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        let idx = bindings.push_binding(v.clone());
                        format!("${idx}")
                    })
                    .collect();
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", column, op, placeholders.join(", "))
            }
            Clause::Between {
                column,
                from,
                to,
                negated,
            } => {
                let idx1 = bindings.push_binding(from.clone());
                let idx2 = bindings.push_binding(to.clone());
                let op = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                format!("{column} {op} ${idx1} AND ${idx2}")
            }
            Clause::DatePart {
                part,
                column,
                op,
                value,
            } => {
                let idx = bindings.push_binding(value.clone());
                match part {
                    DatePart::Date => format!("{column}::date {op} ${idx}"),
                    DatePart::Time => format!("{column}::time {op} ${idx}"),
                    // EXTRACT yields numeric, which would type the parameter
                    // as numeric too; cast so an int binding stays valid.
                    DatePart::Month => format!("EXTRACT(MONTH FROM {column})::int {op} ${idx}"),
                    DatePart::Year => format!("EXTRACT(YEAR FROM {column})::int {op} ${idx}"),
                }
            }
            Clause::ColumnCompare { left, op, right } => {
                format!("{left} {op} {right}")
            }
            Clause::Exists { query, negated } => {
                let sub = crate::grammar::compile_select(query, bindings);
                if *negated {
                    format!("NOT EXISTS ({sub})")
                } else {
                    format!("EXISTS ({sub})")
                }
            }
            Clause::Template { sql, params } => {
                let mut result = String::with_capacity(sql.len());
                let mut next = 0;
                for ch in sql.chars() {
                    if ch == '?' && next < params.len() {
                        let idx = bindings.push_binding(params[next].clone());
                        result.push('$');
                        result.push_str(&idx.to_string());
                        next += 1;
                    } else {
                        result.push(ch);
                    }
                }
                result
            }
            Clause::Raw(sql) => sql.clone(),
            Clause::Group(group) => {
                let inner = group.build(bindings);
                if inner.is_empty() {
                    String::new()
                } else {
                    format!("({inner})")
                }
            }
            Clause::True => "1=1".into(),
            Clause::False => "1=0".into(),
        }
    }
}

/// An ordered sequence of clauses with their AND/OR connectors.
///
/// Build renders the clauses strictly in insertion order, joining each with
/// the connector recorded when it was added. The connector on the first
/// clause is ignored.
#[derive(Clone, Debug, Default)]
pub struct ClauseGroup {
    entries: Vec<(Connector, Clause)>,
}

impl ClauseGroup {
    /// Create a new empty group.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Check if the group is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a clause with an explicit connector.
    pub fn push(&mut self, connector: Connector, clause: Clause) {
        self.entries.push((connector, clause));
    }

    /// Append an AND-connected clause.
    pub fn and(&mut self, clause: Clause) {
        self.push(Connector::And, clause);
    }

    /// Append an OR-connected clause.
    pub fn or(&mut self, clause: Clause) {
        self.push(Connector::Or, clause);
    }

    // ==================== Convenience constructors ====================

    /// column = value
    pub fn eq<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.and(Clause::compare(column, "=", value));
    }

    /// OR column = value
    pub fn or_eq<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.or(Clause::compare(column, "=", value));
    }

    /// column != value
    pub fn ne<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.and(Clause::compare(column, "!=", value));
    }

    /// column > value
    pub fn gt<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.and(Clause::compare(column, ">", value));
    }

    /// column >= value
    pub fn gte<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.and(Clause::compare(column, ">=", value));
    }

    /// column < value
    pub fn lt<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.and(Clause::compare(column, "<", value));
    }

    /// column <= value
    pub fn lte<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        self.and(Clause::compare(column, "<=", value));
    }

    /// column LIKE pattern
    pub fn like<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, pattern: T) {
        self.and(Clause::compare(column, "LIKE", pattern));
    }

    /// column ILIKE pattern (case-insensitive)
    pub fn ilike<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, pattern: T) {
        self.and(Clause::compare(column, "ILIKE", pattern));
    }

    /// column NOT LIKE pattern
    pub fn not_like<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, pattern: T) {
        self.and(Clause::compare(column, "NOT LIKE", pattern));
    }

    /// column IS NULL
    pub fn is_null(&mut self, column: &str) {
        self.and(Clause::Null {
            column: column.to_string(),
            negated: false,
        });
    }

    /// column IS NOT NULL
    pub fn is_not_null(&mut self, column: &str) {
        self.and(Clause::Null {
            column: column.to_string(),
            negated: true,
        });
    }

    /// column IN (values...)
    pub fn in_list<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, values: Vec<T>) {
        self.and(Clause::in_list(column, values));
    }

    /// column NOT IN (values...)
    pub fn not_in<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, values: Vec<T>) {
        self.and(Clause::not_in(column, values));
    }

    /// column BETWEEN from AND to
    pub fn between<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, from: T, to: T) {
        self.and(Clause::Between {
            column: column.to_string(),
            from: Binding::new(from),
            to: Binding::new(to),
            negated: false,
        });
    }

    /// column NOT BETWEEN from AND to
    pub fn not_between<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, from: T, to: T) {
        self.and(Clause::Between {
            column: column.to_string(),
            from: Binding::new(from),
            to: Binding::new(to),
            negated: true,
        });
    }

    /// Raw SQL condition without bindings.
    pub fn raw(&mut self, sql: &str) {
        self.and(Clause::raw(sql));
    }

    /// Condition with `?` placeholders.
    pub fn template<T: ToSql + Send + Sync + 'static>(&mut self, sql: &str, values: Vec<T>) {
        self.and(Clause::template(sql, values));
    }

    /// Render the group (without a leading WHERE/HAVING keyword).
    pub fn build(&self, bindings: &mut Bindings) -> String {
        let mut sql = String::new();
        let mut first = true;
        for (connector, clause) in &self.entries {
            if clause.is_empty() {
                continue;
            }
            let fragment = clause.build(bindings);
            if fragment.is_empty() {
                continue;
            }
            if !first {
                sql.push_str(connector.keyword());
            }
            sql.push_str(&fragment);
            first = false;
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_eq() {
        let clause = Clause::compare("name", "=", "alice");
        let mut bindings = Bindings::new();
        let sql = clause.build(&mut bindings);
        assert_eq!(sql, "name = $1");
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn connectors_render_in_order() {
        let mut group = ClauseGroup::new();
        group.eq("status", "active");
        group.gt("age", 18i32);
        group.or_eq("role", "admin");

        let mut bindings = Bindings::new();
        let sql = group.build(&mut bindings);
        assert_eq!(sql, "status = $1 AND age > $2 OR role = $3");
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn nested_group_is_parenthesized() {
        let mut inner = ClauseGroup::new();
        inner.eq("role", "admin");
        inner.or_eq("role", "superuser");

        let mut group = ClauseGroup::new();
        group.eq("status", "active");
        group.and(Clause::Group(inner));

        let mut bindings = Bindings::new();
        let sql = group.build(&mut bindings);
        assert_eq!(sql, "status = $1 AND (role = $2 OR role = $3)");
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn empty_in_list_is_always_false() {
        let clause = Clause::in_list::<i32>("id", vec![]);
        let mut bindings = Bindings::new();
        assert_eq!(clause.build(&mut bindings), "1=0");
        assert_eq!(bindings.len(), 0);
    }

    #[test]
    fn empty_not_in_list_is_always_true() {
        let clause = Clause::not_in::<i32>("id", vec![]);
        let mut bindings = Bindings::new();
        assert_eq!(clause.build(&mut bindings), "1=1");
        assert_eq!(bindings.len(), 0);
    }

    #[test]
    fn in_list_numbers_each_value() {
        let clause = Clause::in_list("id", vec![1i64, 2, 3]);
        let mut bindings = Bindings::new();
        assert_eq!(clause.build(&mut bindings), "id IN ($1, $2, $3)");
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn between_uses_two_placeholders() {
        let mut group = ClauseGroup::new();
        group.between("age", 18i32, 65i32);
        let mut bindings = Bindings::new();
        assert_eq!(group.build(&mut bindings), "age BETWEEN $1 AND $2");
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn template_renumbers_question_marks() {
        let clause = Clause::template("a = ? OR b = ?", vec![1i32, 2i32]);
        let mut bindings = Bindings::new();
        assert_eq!(clause.build(&mut bindings), "a = $1 OR b = $2");
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn date_part_rendering() {
        let mut bindings = Bindings::new();
        let date = Clause::DatePart {
            part: DatePart::Date,
            column: "created_at".into(),
            op: "=",
            value: Binding::new("2024-01-01"),
        };
        assert_eq!(date.build(&mut bindings), "created_at::date = $1");

        let year = Clause::DatePart {
            part: DatePart::Year,
            column: "created_at".into(),
            op: ">=",
            value: Binding::new(2024i32),
        };
        assert_eq!(
            year.build(&mut bindings),
            "EXTRACT(YEAR FROM created_at)::int >= $2"
        );
    }

    #[test]
    fn column_compare_binds_nothing() {
        let clause = Clause::ColumnCompare {
            left: "orders.user_id".into(),
            op: "=",
            right: "users.id".into(),
        };
        let mut bindings = Bindings::new();
        assert_eq!(clause.build(&mut bindings), "orders.user_id = users.id");
        assert_eq!(bindings.len(), 0);
    }

    #[test]
    fn operator_allowlist() {
        assert_eq!(check_operator("="), Some("="));
        assert_eq!(check_operator("like"), Some("LIKE"));
        assert_eq!(check_operator(" not ilike "), Some("NOT ILIKE"));
        assert_eq!(check_operator("; DROP TABLE users"), None);
        assert_eq!(check_operator("=ANY"), None);
    }
}
