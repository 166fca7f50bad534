//! Target-variable classification
//!
//! A tool's template references some artifact categories (its *targets*)
//! among other parameters. The targets decide whether a run applies to an
//! artifact set at all and which lists may be split.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::language::is_file_category;
use crate::template::{Operator, Template};
use crate::types::ArtifactSet;

/// Decides which parameter names are artifact categories
pub trait TargetClassifier: Send + Sync {
    fn is_target(&self, name: &str) -> bool;
}

impl<F> TargetClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_target(&self, name: &str) -> bool {
        self(name)
    }
}

/// Known category names: `{language}-src`, `srcfile`, plus extras
#[derive(Debug, Clone, Default)]
pub struct CategoryVocabulary {
    extra: BTreeSet<String>,
}

impl CategoryVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also treat `name` as a category
    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.extra.insert(name.into());
        self
    }
}

impl TargetClassifier for CategoryVocabulary {
    fn is_target(&self, name: &str) -> bool {
        is_file_category(name) || self.extra.contains(name)
    }
}

/// A category referenced by a template and the separator it is joined with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetVariable {
    pub name: String,
    pub separator: String,
    /// Some reference puts the files themselves on the command line;
    /// false when the category only drives `?+`/`?-` conditionals
    pub listed: bool,
}

/// Target categories of `template`, in order of first occurrence
///
/// The separator is the one declared at the first occurrence; plain and
/// conditional references count as a single space.
pub fn target_variables(
    template: &Template,
    classifier: &dyn TargetClassifier,
) -> Vec<TargetVariable> {
    let mut seen = BTreeSet::new();
    let mut targets: Vec<TargetVariable> = template
        .tokens()
        .filter(|t| classifier.is_target(&t.name))
        .filter(|t| seen.insert(t.name.clone()))
        .map(|t| TargetVariable {
            name: t.name.clone(),
            separator: t.separator().to_owned(),
            listed: false,
        })
        .collect();

    for token in template.tokens() {
        if matches!(token.operator, Operator::Plain | Operator::Join(_)) {
            if let Some(target) = targets.iter_mut().find(|t| t.name == token.name) {
                target.listed = true;
            }
        }
    }
    targets
}

/// Whether the run has anything to do: some target category is non-empty
pub fn is_applicable(targets: &[TargetVariable], artifacts: &ArtifactSet) -> bool {
    targets.iter().any(|t| artifacts.has_files(&t.name))
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;

    fn vocabulary() -> CategoryVocabulary {
        CategoryVocabulary::new()
    }

    #[test]
    fn test_targets_with_separators_in_first_occurrence_order() {
        let t = Template::parse(
            "tool <tool-dir> <php-src%,> <srcfile> <php-src% > <javascript-src?+--js>",
        )
        .unwrap();
        let targets = target_variables(&t, &vocabulary());
        assert_eq!(
            targets,
            vec![
                TargetVariable {
                    name: "php-src".to_string(),
                    separator: ",".to_string(),
                    listed: true,
                },
                TargetVariable {
                    name: "srcfile".to_string(),
                    separator: " ".to_string(),
                    listed: true,
                },
                TargetVariable {
                    name: "javascript-src".to_string(),
                    separator: " ".to_string(),
                    listed: false,
                },
            ]
        );
    }

    #[test]
    fn test_php_only_template_not_applicable_without_php_files() {
        let t = Template::parse("phpmd <php-src%,> xml").unwrap();
        let targets = target_variables(&t, &vocabulary());

        let absent = ArtifactSet::new("1")
            .with_category("javascript-src", vec!["/a.js".to_string()])
            .unwrap();
        assert!(!is_applicable(&targets, &absent));

        let empty = absent.clone().with_category("php-src", Vec::new()).unwrap();
        assert!(!is_applicable(&targets, &empty));

        let present = absent
            .with_category("php-src", vec!["/a.php".to_string()])
            .unwrap();
        assert!(is_applicable(&targets, &present));
    }

    #[test]
    fn test_conditional_reference_after_first_use_still_lists() {
        let t = Template::parse("tool <php-src?+--php> <php-src% >").unwrap();
        let targets = target_variables(&t, &vocabulary());
        assert_eq!(targets.len(), 1);
        assert!(targets[0].listed);
    }

    #[test]
    fn test_template_without_targets_never_applies() {
        let t = Template::parse("retire --path <package-dir>").unwrap();
        let targets = target_variables(&t, &vocabulary());
        assert!(targets.is_empty());
        let set = ArtifactSet::new("1")
            .with_category("srcfile", vec!["/a".to_string()])
            .unwrap();
        assert!(!is_applicable(&targets, &set));
    }

    #[test]
    fn test_extra_categories_and_closure_classifiers() {
        let t = Template::parse("csc <library% > <classpath% >").unwrap();
        let extended = CategoryVocabulary::new().with_category("library");
        let names: Vec<_> = target_variables(&t, &extended)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["library"]);

        let only_classpath = |name: &str| name == "classpath";
        let names: Vec<_> = target_variables(&t, &only_classpath)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["classpath"]);
    }
}
