//! Parameter storage using Arc for clone-friendly query builders.

use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A clone-friendly parameter value wrapper using Arc.
///
/// Builders can be cloned (e.g. for `chunk` pagination or subqueries) without
/// copying the underlying values.
#[derive(Clone)]
pub struct Binding(pub(crate) Arc<dyn ToSql + Send + Sync>);

impl Binding {
    /// Create a new binding from any ToSql value.
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Binding(Arc::new(value))
    }

    /// Get a reference to the inner value as a ToSql trait object.
    pub fn as_ref(&self) -> &(dyn ToSql + Sync) {
        &*self.0 as &(dyn ToSql + Sync)
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl<T: ToSql + Send + Sync + 'static> From<T> for Binding {
    fn from(value: T) -> Self {
        Binding::new(value)
    }
}

/// The ordered binding list produced alongside a compiled statement.
///
/// Invariant: the number of bindings always equals the number of `$n`
/// placeholders in the compiled SQL.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    values: Vec<Binding>,
}

impl Bindings {
    /// Create a new empty binding list.
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Add a value and return its 1-based placeholder index.
    pub fn push<T: ToSql + Send + Sync + 'static>(&mut self, value: T) -> usize {
        self.values.push(Binding::new(value));
        self.values.len()
    }

    /// Add a pre-wrapped binding and return its 1-based placeholder index.
    pub fn push_binding(&mut self, binding: Binding) -> usize {
        self.values.push(binding);
        self.values.len()
    }

    /// Current binding count.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get all bindings as references for tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values.iter().map(|b| b.as_ref()).collect()
    }

    /// Render each binding as a debug string, for diagnostics.
    pub fn describe(&self) -> Vec<String> {
        self.values.iter().map(|b| format!("{b:?}")).collect()
    }
}
