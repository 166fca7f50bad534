//! Per-tool behavior, expressed as data instead of tool-specific code paths

use std::fmt;
use std::sync::Arc;

use crate::classify::{CategoryVocabulary, TargetClassifier, TargetVariable};
use crate::language::Language;
use crate::types::ArtifactSet;

type SplitPredicate = dyn Fn(&str) -> bool + Send + Sync;

/// How the engine treats one tool
///
/// - the classifier picks the template parameters that are categories
/// - the split predicate says which of those may be bisected
/// - excluded extensions are dropped from target lists up front
#[derive(Clone)]
pub struct ToolProfile {
    classifier: Arc<dyn TargetClassifier>,
    splittable: Arc<SplitPredicate>,
    excluded_extensions: Vec<String>,
}

impl Default for ToolProfile {
    fn default() -> Self {
        Self {
            classifier: Arc::new(CategoryVocabulary::new()),
            splittable: Arc::new(|_: &str| true),
            excluded_extensions: Vec::new(),
        }
    }
}

impl fmt::Debug for ToolProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolProfile")
            .field("excluded_extensions", &self.excluded_extensions)
            .finish_non_exhaustive()
    }
}

impl ToolProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in profile for a `tool-type` value
    pub fn for_tool_type(tool_type: &str) -> Self {
        match tool_type.to_lowercase().as_str() {
            // complexity metrics are meaningless for stylesheets and markup
            "lizard" => Self::new().excluding_languages(&[Language::Css, Language::Xml]),
            // these read their inputs from a response file, never the command line
            "roslyn-security-guard" | "roslyn-security-gaurd" | "code-cracker" => {
                Self::new().without_splitting()
            }
            _ => Self::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: impl TargetClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_split_predicate(
        mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.splittable = Arc::new(predicate);
        self
    }

    /// Never bisect any category
    pub fn without_splitting(self) -> Self {
        self.with_split_predicate(|_| false)
    }

    /// Drop files with these extensions (leading dot optional) from targets
    pub fn excluding_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ext in extensions {
            let ext = ext.as_ref().trim();
            if ext.is_empty() {
                continue;
            }
            let ext = if ext.starts_with('.') {
                ext.to_lowercase()
            } else {
                format!(".{}", ext.to_lowercase())
            };
            if !self.excluded_extensions.contains(&ext) {
                self.excluded_extensions.push(ext);
            }
        }
        self
    }

    /// Drop files of these languages from targets
    pub fn excluding_languages(self, languages: &[Language]) -> Self {
        self.excluding_extensions(languages.iter().flat_map(|l| l.extensions().iter()))
    }

    pub fn classifier(&self) -> &dyn TargetClassifier {
        self.classifier.as_ref()
    }

    pub fn is_splittable(&self, category: &str) -> bool {
        (self.splittable)(category)
    }

    pub fn excluded_extensions(&self) -> &[String] {
        &self.excluded_extensions
    }

    /// Remove excluded files from the target categories of `artifacts`
    pub fn filter(&self, artifacts: &ArtifactSet, targets: &[TargetVariable]) -> ArtifactSet {
        if self.excluded_extensions.is_empty() {
            return artifacts.clone();
        }
        targets.iter().fold(artifacts.clone(), |set, target| {
            set.map_category(&target.name, |files| {
                files
                    .iter()
                    .filter(|f| !self.is_excluded(f))
                    .cloned()
                    .collect()
            })
        })
    }

    fn is_excluded(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.excluded_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }
}
