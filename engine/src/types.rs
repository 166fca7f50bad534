//! Core type definitions: symbol values, symbol tables and artifact sets

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::language::{is_file_category, is_language_category, ALL_SOURCE_FILES};

/// Scalar holding the directory the build ran in
pub const BUILD_ROOT_DIR: &str = "build-root-dir";

/// A value bound to a template parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Single string (configuration values, paths, identifiers)
    Scalar(String),
    /// Ordered list (file lists, flags); order is significant
    List(Vec<String>),
}

impl Value {
    /// Get the scalar string, if this is a scalar
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }

    /// Get the list items, if this is a list
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::Scalar(_) => None,
            Self::List(items) => Some(items),
        }
    }

    /// Whether the value carries no text at all
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_owned())
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<&[&str]> for Value {
    fn from(items: &[&str]) -> Self {
        Self::List(items.iter().map(|s| (*s).to_owned()).collect())
    }
}

/// Case-sensitive mapping from parameter name to value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolTable {
    entries: BTreeMap<String, Value>,
}

impl SymbolTable {
    /// Create an empty symbol table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Look up a scalar value
    pub fn scalar(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_scalar)
    }

    /// Remove a binding
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    /// Whether the name is bound
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Overlay another table; its bindings win
    pub fn merge(&mut self, other: &Self) {
        for (name, value) in &other.entries {
            self.entries.insert(name.clone(), value.clone());
        }
    }

    /// Iterate bindings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Errors raised while building an artifact set
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Relative path '{path}' in category '{category}' and no build root to resolve it")]
    RelativePath { category: String, path: String },

    #[error("Duplicate path '{path}' in category '{category}'")]
    DuplicatePath { category: String, path: String },

    #[error("Invalid artifact description: {0}")]
    InvalidDescription(#[from] serde_json::Error),
}

/// Source files and scalar metadata for one tool run, partitioned by category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    /// Identifier; chunks derive `{parent}-{n}` from it
    pub id: String,
    categories: BTreeMap<String, Vec<String>>,
    scalars: BTreeMap<String, String>,
}

impl ArtifactSet {
    /// Create an empty artifact set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            categories: BTreeMap::new(),
            scalars: BTreeMap::new(),
        }
    }

    /// Add a category
    ///
    /// Source file categories (`{language}-src`, `srcfile`) must hold
    /// absolute, unique paths; use [`ArtifactSetBuilder`] when they still
    /// need resolving. Any other list (flags, class paths) is kept as given.
    pub fn with_category(
        self,
        name: impl Into<String>,
        files: Vec<String>,
    ) -> Result<Self, ArtifactError> {
        let name = name.into();
        if is_file_category(&name) {
            self.with_files(name, files)
        } else {
            Ok(self.with_list(name, files))
        }
    }

    /// Add a category of absolute, unique file paths under any name
    pub fn with_files(
        mut self,
        name: impl Into<String>,
        files: Vec<String>,
    ) -> Result<Self, ArtifactError> {
        let name = name.into();
        let mut seen = std::collections::HashSet::new();
        for path in &files {
            if !Path::new(path).is_absolute() {
                return Err(ArtifactError::RelativePath {
                    category: name,
                    path: path.clone(),
                });
            }
            if !seen.insert(path.as_str()) {
                return Err(ArtifactError::DuplicatePath {
                    category: name,
                    path: path.clone(),
                });
            }
        }
        self.categories.insert(name, files);
        Ok(self)
    }

    /// Add a list of free-form values, stored verbatim
    pub fn with_list(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.categories.insert(name.into(), values);
        self
    }

    /// Add a scalar
    pub fn with_scalar(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.scalars.insert(key.into(), value.into());
        self
    }

    /// Files of a category, if present
    pub fn files(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    /// Whether a category is present and holds at least one file
    pub fn has_files(&self, category: &str) -> bool {
        self.files(category).is_some_and(|f| !f.is_empty())
    }

    /// Scalar value, if present
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.scalars.get(key).map(String::as_str)
    }

    /// Category names in name order
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Total number of files across categories
    pub fn total_files(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Symbol table view: scalars, category lists and `id`
    pub fn symbols(&self) -> SymbolTable {
        let mut table: SymbolTable = self
            .scalars
            .iter()
            .map(|(k, v)| (k.clone(), Value::Scalar(v.clone())))
            .collect();
        for (name, files) in &self.categories {
            table.insert(name.clone(), Value::List(files.clone()));
        }
        table.insert("id", self.id.clone());
        table
    }

    /// Derive a chunk: one category replaced, other listed categories dropped
    pub(crate) fn derive(
        &self,
        id: String,
        category: &str,
        files: Vec<String>,
        drop: &[&str],
    ) -> Self {
        let mut categories: BTreeMap<String, Vec<String>> = self
            .categories
            .iter()
            .filter(|(name, _)| !drop.contains(&name.as_str()))
            .map(|(name, list)| (name.clone(), list.clone()))
            .collect();
        categories.insert(category.to_owned(), files);

        Self {
            id,
            categories,
            scalars: self.scalars.clone(),
        }
    }

    /// Copy with categories removed
    pub(crate) fn without(&self, drop: &[&str]) -> Self {
        let mut copy = self.clone();
        copy.categories
            .retain(|name, _| !drop.contains(&name.as_str()));
        copy
    }

    /// Copy with a category list rewritten by `f`
    pub(crate) fn map_category(
        &self,
        category: &str,
        f: impl FnOnce(&[String]) -> Vec<String>,
    ) -> Self {
        let mut copy = self.clone();
        if let Some(files) = copy.categories.get_mut(category) {
            *files = f(files);
        }
        copy
    }

    /// Parse one artifact description, or an array of them, from JSON
    pub fn from_json(json: &str) -> Result<Vec<Self>, ArtifactError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(ArtifactDescription),
            Many(Vec<ArtifactDescription>),
        }

        let descriptions = match serde_json::from_str::<OneOrMany>(json)? {
            OneOrMany::One(d) => vec![d],
            OneOrMany::Many(ds) => ds,
        };
        descriptions
            .into_iter()
            .map(ArtifactDescription::build)
            .collect()
    }
}

/// Serialized form of an artifact set as produced by build collaborators
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArtifactDescription {
    pub id: String,
    #[serde(default)]
    pub build_root_dir: Option<PathBuf>,
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub scalars: BTreeMap<String, String>,
    /// Extra category names holding file paths
    #[serde(default)]
    pub file_categories: Vec<String>,
}

impl ArtifactDescription {
    /// Resolve into an artifact set
    pub fn build(self) -> Result<ArtifactSet, ArtifactError> {
        let mut builder = ArtifactSetBuilder::new(self.id);
        if let Some(root) = self.build_root_dir {
            builder = builder.build_root(root);
        }
        for name in self.file_categories {
            builder = builder.file_category(name);
        }
        for (name, files) in self.categories {
            builder = builder.category(name, files);
        }
        for (key, value) in self.scalars {
            builder = builder.scalar(key, value);
        }
        builder.build()
    }
}

/// Builds an [`ArtifactSet`] from raw build output
///
/// In file categories, relative paths are joined onto the build root and
/// duplicates are dropped, keeping the first occurrence. Other lists pass
/// through untouched. Unless given explicitly, `srcfile` becomes the
/// concatenation of every per-language category.
#[derive(Debug, Clone)]
pub struct ArtifactSetBuilder {
    id: String,
    build_root: Option<PathBuf>,
    categories: BTreeMap<String, Vec<String>>,
    scalars: BTreeMap<String, String>,
    file_categories: BTreeSet<String>,
}

impl ArtifactSetBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            build_root: None,
            categories: BTreeMap::new(),
            scalars: BTreeMap::new(),
            file_categories: BTreeSet::new(),
        }
    }

    /// Directory relative paths are resolved against
    pub fn build_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.build_root = Some(root.into());
        self
    }

    /// Append files to a category
    pub fn category<I, S>(mut self, name: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .entry(name.into())
            .or_default()
            .extend(files.into_iter().map(Into::into));
        self
    }

    pub fn scalar(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.scalars.insert(key.into(), value.into());
        self
    }

    /// Treat `name` as a file category in addition to the built-in ones
    pub fn file_category(mut self, name: impl Into<String>) -> Self {
        self.file_categories.insert(name.into());
        self
    }

    fn holds_files(&self, name: &str) -> bool {
        is_file_category(name) || self.file_categories.contains(name)
    }

    /// Resolve paths and produce the artifact set
    pub fn build(mut self) -> Result<ArtifactSet, ArtifactError> {
        let mut categories = BTreeMap::new();

        for (name, files) in std::mem::take(&mut self.categories) {
            if !self.holds_files(&name) {
                categories.insert(name, files);
                continue;
            }
            let mut seen = std::collections::HashSet::new();
            let mut resolved = Vec::with_capacity(files.len());
            for file in files {
                let path = self.resolve(&name, file)?;
                if seen.insert(path.clone()) {
                    resolved.push(path);
                }
            }
            categories.insert(name, resolved);
        }

        if !categories.contains_key(ALL_SOURCE_FILES) {
            let all: Vec<String> = categories
                .iter()
                .filter(|(name, _)| is_language_category(name))
                .flat_map(|(_, files)| files.iter().cloned())
                .collect();
            categories.insert(ALL_SOURCE_FILES.to_owned(), all);
        }

        let mut scalars = self.scalars;
        if let Some(root) = &self.build_root {
            scalars
                .entry(BUILD_ROOT_DIR.to_owned())
                .or_insert_with(|| root.to_string_lossy().into_owned());
        }

        Ok(ArtifactSet {
            id: self.id,
            categories,
            scalars,
        })
    }

    fn resolve(&self, category: &str, file: String) -> Result<String, ArtifactError> {
        if Path::new(&file).is_absolute() {
            return Ok(file);
        }
        match &self.build_root {
            Some(root) => Ok(root.join(&file).to_string_lossy().into_owned()),
            None => Err(ArtifactError::RelativePath {
                category: category.to_owned(),
                path: file,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_table_merge_overrides() {
        let mut base = SymbolTable::new().with("a", "1").with("b", "2");
        let over = SymbolTable::new().with("b", "3");
        base.merge(&over);
        assert_eq!(base.scalar("a"), Some("1"));
        assert_eq!(base.scalar("b"), Some("3"));
    }

    #[test]
    fn test_value_untagged_json() {
        let table: SymbolTable =
            serde_json::from_str(r#"{"flag": "true", "files": ["/a.js", "/b.js"]}"#).unwrap();
        assert_eq!(table.scalar("flag"), Some("true"));
        assert_eq!(
            table.get("files").and_then(Value::as_list).map(<[String]>::len),
            Some(2)
        );
    }

    #[test]
    fn test_with_category_rejects_relative() {
        let err = ArtifactSet::new("1")
            .with_category("php-src", vec!["src/a.php".to_string()])
            .unwrap_err();
        assert!(matches!(err, ArtifactError::RelativePath { .. }));
    }

    #[test]
    fn test_with_category_rejects_duplicates() {
        let err = ArtifactSet::new("1")
            .with_category("php-src", vec!["/a.php".to_string(), "/a.php".to_string()])
            .unwrap_err();
        assert!(matches!(err, ArtifactError::DuplicatePath { .. }));
    }

    #[test]
    fn test_builder_resolves_and_dedups() {
        let set = ArtifactSetBuilder::new("1")
            .build_root("/build")
            .category("javascript-src", ["lib/a.js", "/abs/b.js", "lib/a.js"])
            .category("php-src", ["index.php"])
            .build()
            .unwrap();

        assert_eq!(
            set.files("javascript-src").unwrap(),
            ["/build/lib/a.js", "/abs/b.js"]
        );
        // srcfile aggregates per-language categories in name order
        assert_eq!(
            set.files(ALL_SOURCE_FILES).unwrap(),
            ["/build/lib/a.js", "/abs/b.js", "/build/index.php"]
        );
        assert_eq!(set.scalar(BUILD_ROOT_DIR), Some("/build"));
    }

    #[test]
    fn test_non_file_lists_pass_through() {
        let set = ArtifactSet::from_json(
            r#"{"id": "1", "build-root-dir": "/pkg",
                "categories": {"flag": ["/nowarn:1591", "-langversion:7", "-langversion:7"],
                               "library": ["lib/a.dll"], "dotnet-src": ["a.cs"]},
                "file-categories": ["library"]}"#,
        )
        .unwrap()
        .remove(0);
        assert_eq!(
            set.files("flag").unwrap(),
            ["/nowarn:1591", "-langversion:7", "-langversion:7"]
        );
        assert_eq!(set.files("library").unwrap(), ["/pkg/lib/a.dll"]);
        assert_eq!(set.files("dotnet-src").unwrap(), ["/pkg/a.cs"]);
        // flags are not source files
        assert_eq!(set.files(ALL_SOURCE_FILES).unwrap(), ["/pkg/a.cs"]);

        let direct = ArtifactSet::new("1")
            .with_category("flag", vec!["-x".to_string()])
            .unwrap();
        assert_eq!(direct.files("flag").unwrap(), ["-x"]);
        assert!(ArtifactSet::new("1")
            .with_files("library", vec!["lib.dll".to_string()])
            .is_err());
    }

    #[test]
    fn test_builder_keeps_explicit_srcfile() {
        let set = ArtifactSetBuilder::new("1")
            .category("javascript-src", ["/a.js"])
            .category(ALL_SOURCE_FILES, ["/only.c"])
            .build()
            .unwrap();
        assert_eq!(set.files(ALL_SOURCE_FILES).unwrap(), ["/only.c"]);
    }

    #[test]
    fn test_builder_without_root_rejects_relative() {
        let err = ArtifactSetBuilder::new("1")
            .category("css-src", ["style.css"])
            .build()
            .unwrap_err();
        assert!(matches!(err, ArtifactError::RelativePath { .. }));
    }

    #[test]
    fn test_symbols_include_id_and_lists() {
        let set = ArtifactSet::new("7")
            .with_scalar("package-name", "demo")
            .with_category("php-src", vec!["/a.php".to_string()])
            .unwrap();
        let symbols = set.symbols();
        assert_eq!(symbols.scalar("id"), Some("7"));
        assert_eq!(symbols.scalar("package-name"), Some("demo"));
        assert!(symbols.get("php-src").and_then(Value::as_list).is_some());
    }

    #[test]
    fn test_from_json_one_or_many() {
        let one = ArtifactSet::from_json(
            r#"{"id": "1", "build-root-dir": "/b", "categories": {"php-src": ["x.php"]}}"#,
        )
        .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].files("php-src").unwrap(), ["/b/x.php"]);

        let many = ArtifactSet::from_json(r#"[{"id": "1"}, {"id": "2"}]"#).unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].id, "2");
    }
}
