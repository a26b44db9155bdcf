use super::Constraint;
use crate::relations::Relation;
use indexmap::IndexMap;
use tracing::trace;

/// One entry of an eager-load specification
#[derive(Debug, Clone)]
pub enum Include {
    /// A plain dot path, optionally suffixed `name:col1,col2`
    Path(String),
    /// A dot path with a constraint. The path is taken literally.
    Constrained(String, Constraint),
    /// A key (optionally `name:col1,col2`) with nested entries under it
    Nested(String, Vec<Include>),
}

impl Include {
    pub fn path(path: &str) -> Self {
        Include::Path(path.to_string())
    }

    pub fn constrained<F>(path: &str, constraint: F) -> Self
    where
        F: Fn(&mut Relation) + Send + Sync + 'static,
    {
        Include::Constrained(path.to_string(), Constraint::new(constraint))
    }

    pub fn nested(key: &str, entries: impl Into<NestedSpec>) -> Self {
        Include::Nested(key.to_string(), entries.into().0)
    }
}

/// The literal specification passed to `with(...)`
#[derive(Debug, Clone, Default)]
pub struct NestedSpec(pub Vec<Include>);

impl From<&str> for NestedSpec {
    fn from(path: &str) -> Self {
        NestedSpec(vec![Include::path(path)])
    }
}

impl From<String> for NestedSpec {
    fn from(path: String) -> Self {
        NestedSpec(vec![Include::Path(path)])
    }
}

impl From<Vec<&str>> for NestedSpec {
    fn from(paths: Vec<&str>) -> Self {
        NestedSpec(paths.into_iter().map(Include::path).collect())
    }
}

impl From<Vec<String>> for NestedSpec {
    fn from(paths: Vec<String>) -> Self {
        NestedSpec(paths.into_iter().map(Include::Path).collect())
    }
}

impl<const N: usize> From<[&str; N]> for NestedSpec {
    fn from(paths: [&str; N]) -> Self {
        NestedSpec(paths.into_iter().map(Include::path).collect())
    }
}

impl From<Include> for NestedSpec {
    fn from(include: Include) -> Self {
        NestedSpec(vec![include])
    }
}

impl From<Vec<Include>> for NestedSpec {
    fn from(includes: Vec<Include>) -> Self {
        NestedSpec(includes)
    }
}

impl<const N: usize> From<[Include; N]> for NestedSpec {
    fn from(includes: [Include; N]) -> Self {
        NestedSpec(includes.into())
    }
}

/// Normalized eager-load map: relation path to composed constraint.
///
/// Every ancestor of a present path is itself present, so intermediate
/// levels always load.
#[derive(Debug, Clone, Default)]
pub struct EagerLoadSpec {
    entries: IndexMap<String, Constraint>,
}

impl EagerLoadSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(spec: impl Into<NestedSpec>) -> Self {
        let spec = spec.into();
        let mut entries = IndexMap::new();
        if spec.0.is_empty() {
            return Self { entries };
        }

        for (name, constraint) in prepare_nested(&spec.0, "") {
            add_nested_withs(&name, &mut entries);
            entries.insert(name, constraint);
        }

        trace!(paths = ?entries.keys().collect::<Vec<_>>(), "Parsed eager-load specification");
        Self { entries }
    }

    /// Fold `other` into this spec. Paths present on both sides keep both
    /// constraints, this spec's first.
    pub fn merge(&mut self, other: EagerLoadSpec) {
        for (path, constraint) in other.entries {
            let combined = match self.entries.get(&path) {
                Some(existing) => existing.clone().then(constraint),
                None => constraint,
            };
            self.entries.insert(path, combined);
        }
    }

    /// Remove an exact path. Paths nested under it are left in place.
    pub fn remove(&mut self, path: &str) -> Option<Constraint> {
        self.entries.shift_remove(path)
    }

    /// Paths strictly under `name.`, with that prefix stripped
    pub fn nested_under(&self, name: &str) -> EagerLoadSpec {
        let prefix = format!("{name}.");
        let entries = self
            .entries
            .iter()
            .filter_map(|(path, constraint)| {
                path.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), constraint.clone()))
            })
            .collect();
        Self { entries }
    }

    /// Paths without a dot, in specification order
    pub fn top_level(&self) -> Vec<(String, Constraint)> {
        self.entries
            .iter()
            .filter(|(path, _)| !path.contains('.'))
            .map(|(path, constraint)| (path.clone(), constraint.clone()))
            .collect()
    }

    pub fn get(&self, path: &str) -> Option<&Constraint> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Constraint)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Flatten nested entries into dot paths, then normalize flat entries,
/// composing constraints for paths seen more than once.
fn prepare_nested(includes: &[Include], prefix: &str) -> IndexMap<String, Constraint> {
    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}.")
    };
    let mut prepared: IndexMap<String, Constraint> = IndexMap::new();

    for include in includes {
        if let Include::Nested(key, children) = include {
            let (attribute, select) = parse_name_and_select(key);
            let path = format!("{prefix}{attribute}");
            prepared.insert(path.clone(), select);
            prepared.extend(prepare_nested(children, &path));
        }
    }

    for include in includes {
        let (key, constraint) = match include {
            Include::Nested(..) => continue,
            Include::Path(path) => parse_name_and_select(path),
            Include::Constrained(path, constraint) => (path.clone(), constraint.clone()),
        };
        let path = format!("{prefix}{key}");
        let combined = match prepared.get(&path) {
            Some(existing) => existing.clone().then(constraint),
            None => constraint,
        };
        prepared.insert(path, combined);
    }

    prepared
}

/// Split `name:col1,col2` into the name and a column-selecting constraint
fn parse_name_and_select(name: &str) -> (String, Constraint) {
    match name.split_once(':') {
        Some((name, columns)) => {
            let columns = columns
                .split(',')
                .map(str::trim)
                .filter(|column| !column.is_empty())
                .map(str::to_string)
                .collect();
            (name.to_string(), Constraint::select_columns(columns))
        }
        None => (name.to_string(), Constraint::noop()),
    }
}

/// Insert a no-op for every ancestor of `name` not already present
fn add_nested_withs(name: &str, entries: &mut IndexMap<String, Constraint>) {
    let mut progress: Vec<&str> = Vec::new();
    for segment in name.split('.') {
        progress.push(segment);
        let path = progress.join(".");
        entries.entry(path).or_insert_with(Constraint::noop);
    }
}
