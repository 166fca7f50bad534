//! Invocation composition for one tool run
//!
//! Classifies the template, filters and splits the artifact set, and
//! evaluates the template once per chunk. Nothing is written to disk here;
//! the runner creates the results directory and captures output.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chunking::{ChunkError, Chunker};
use crate::classify::{is_applicable, target_variables, TargetVariable};
use crate::config::{ToolConfig, DEFAULT_REPORT_TEMPLATE};
use crate::profile::ToolProfile;
use crate::template::{Command, Template};
use crate::types::{ArtifactSet, SymbolTable, BUILD_ROOT_DIR};

/// Composition failures
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(
        "Report template '{template}' has no {{0}} placeholder but the run needs {count} invocations"
    )]
    AmbiguousReportPath { template: String, count: usize },
}

/// One command ready for the process runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Invocation {
    pub id: String,
    pub command: Command,
    /// Artifact subset this command covers
    pub artifacts: ArtifactSet,
    /// Category that was split for this invocation, if any
    pub category: Option<String>,
    pub report_path: PathBuf,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub working_dir: PathBuf,
}

/// Where an invocation's report and captured output go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLayout {
    results_dir: PathBuf,
    report_template: String,
    report_on_stdout: bool,
}

impl ReportLayout {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            report_template: DEFAULT_REPORT_TEMPLATE.to_owned(),
            report_on_stdout: false,
        }
    }

    /// Layout from `assessment-report-template` and `report-on-stdout`
    pub fn from_config(config: &ToolConfig, results_dir: impl Into<PathBuf>) -> Self {
        Self::new(results_dir)
            .with_report_template(config.report_template())
            .with_report_on_stdout(config.report_on_stdout())
    }

    pub fn with_report_template(mut self, template: impl Into<String>) -> Self {
        self.report_template = template.into();
        self
    }

    pub fn with_report_on_stdout(mut self, on_stdout: bool) -> Self {
        self.report_on_stdout = on_stdout;
        self
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Whether distinct ids give distinct report paths
    pub fn has_placeholder(&self) -> bool {
        self.report_template.contains("{0}") || self.report_template.contains("{}")
    }

    pub fn report_path(&self, id: &str) -> PathBuf {
        let name = self
            .report_template
            .replace("{0}", id)
            .replace("{}", id);
        self.results_dir.join(name)
    }

    /// The report itself when the tool writes it to stdout
    pub fn stdout_path(&self, id: &str) -> PathBuf {
        if self.report_on_stdout {
            self.report_path(id)
        } else {
            self.results_dir.join(format!("swa_tool_stdout{}.out", id))
        }
    }

    pub fn stderr_path(&self, id: &str) -> PathBuf {
        self.results_dir.join(format!("swa_tool_stderr{}.out", id))
    }
}

/// Builds the invocation list for one tool over artifact sets
#[derive(Debug, Clone)]
pub struct Composer {
    template: Template,
    chunker: Chunker,
    layout: ReportLayout,
    tool_symbols: SymbolTable,
    working_dir: Option<PathBuf>,
}

impl Composer {
    pub fn new(template: Template, max_size: usize, layout: ReportLayout) -> Self {
        Self {
            template,
            chunker: Chunker::new(max_size),
            layout,
            tool_symbols: SymbolTable::new(),
            working_dir: None,
        }
    }

    /// Composer for a configured tool: its profile, symbols and report layout
    pub fn from_config(
        config: &ToolConfig,
        template: Template,
        max_size: usize,
        results_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::new(
            template,
            max_size,
            ReportLayout::from_config(config, results_dir),
        )
        .with_profile(config.profile())
        .with_tool_symbols(config.symbols())
    }

    pub fn with_profile(mut self, profile: ToolProfile) -> Self {
        self.chunker = self.chunker.with_profile(profile);
        self
    }

    /// Symbols layered over every artifact set's own
    pub fn with_tool_symbols(mut self, symbols: SymbolTable) -> Self {
        self.tool_symbols = symbols;
        self
    }

    /// Directory tools run in; defaults to the build root, else the results dir
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    pub fn targets(&self) -> Vec<TargetVariable> {
        target_variables(&self.template, self.chunker.profile().classifier())
    }

    /// Symbols one invocation is evaluated with
    ///
    /// Artifact symbols, then tool configuration, then the per-run names.
    pub fn run_symbols(&self, artifacts: &ArtifactSet) -> SymbolTable {
        let mut symbols = artifacts.symbols();
        symbols.merge(&self.tool_symbols);
        symbols.insert("build-artifact-id", artifacts.id.clone());
        symbols.insert(
            "results-root-dir",
            self.layout.results_dir().to_string_lossy().into_owned(),
        );
        symbols.insert(
            "assessment-report",
            self.layout
                .report_path(&artifacts.id)
                .to_string_lossy()
                .into_owned(),
        );
        symbols
    }

    /// Invocations for `artifacts`; empty when the tool has nothing to look at
    pub fn compose(&self, artifacts: &ArtifactSet) -> Result<Vec<Invocation>, ComposeError> {
        let targets = self.targets();
        let artifacts = self.chunker.profile().filter(artifacts, &targets);

        if !is_applicable(&targets, &artifacts) {
            log::info!(
                "{}: no files for {}, skipping",
                artifacts.id,
                describe(&targets)
            );
            return Ok(Vec::new());
        }

        let chunks = self
            .chunker
            .split_with(&artifacts, &self.template, |set| self.run_symbols(set))?;

        if chunks.len() > 1 && !self.layout.has_placeholder() {
            return Err(ComposeError::AmbiguousReportPath {
                template: self.layout.report_template.clone(),
                count: chunks.len(),
            });
        }

        let working_dir = self.working_dir(&artifacts);
        let invocations = chunks
            .into_iter()
            .map(|chunk| {
                let id = chunk.artifacts.id.clone();
                let command = self.template.evaluate(&self.run_symbols(&chunk.artifacts));
                Invocation {
                    report_path: self.layout.report_path(&id),
                    stdout_path: self.layout.stdout_path(&id),
                    stderr_path: self.layout.stderr_path(&id),
                    working_dir: working_dir.clone(),
                    command,
                    artifacts: chunk.artifacts,
                    category: chunk.category,
                    id,
                }
            })
            .collect::<Vec<_>>();

        log::debug!("{}: {} invocations", artifacts.id, invocations.len());
        Ok(invocations)
    }

    fn working_dir(&self, artifacts: &ArtifactSet) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| artifacts.scalar(BUILD_ROOT_DIR).map(PathBuf::from))
            .unwrap_or_else(|| self.layout.results_dir().to_path_buf())
    }
}

fn describe(targets: &[TargetVariable]) -> String {
    if targets.is_empty() {
        "a template without file categories".to_owned()
    } else {
        targets
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;
    use crate::budget::estimated_size;
    use std::collections::BTreeMap;

    fn js_files(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("/pkg/src/file{:03}.js", i)).collect()
    }

    fn artifacts(n: usize) -> ArtifactSet {
        ArtifactSet::new("1")
            .with_scalar(BUILD_ROOT_DIR, "/pkg")
            .with_category("javascript-src", js_files(n))
            .unwrap()
    }

    fn composer(source: &str, max_size: usize) -> Composer {
        Composer::new(
            Template::parse(source).unwrap(),
            max_size,
            ReportLayout::new("/results"),
        )
    }

    #[test]
    fn test_single_invocation_paths() {
        let composer = composer("eslint -o <assessment-report> <javascript-src% >", 10_000);
        let invocations = composer.compose(&artifacts(3)).unwrap();
        assert_eq!(invocations.len(), 1);

        let inv = &invocations[0];
        assert_eq!(inv.id, "1");
        assert_eq!(inv.category, None);
        assert_eq!(inv.report_path, PathBuf::from("/results/assessment_report1.xml"));
        assert_eq!(inv.stdout_path, PathBuf::from("/results/swa_tool_stdout1.out"));
        assert_eq!(inv.stderr_path, PathBuf::from("/results/swa_tool_stderr1.out"));
        assert_eq!(inv.working_dir, PathBuf::from("/pkg"));
        assert_eq!(
            inv.command.argv()[..3],
            ["eslint", "-o", "/results/assessment_report1.xml"]
        );
        assert_eq!(inv.command.argv().len(), 6);
    }

    #[test]
    fn test_not_applicable_is_empty() {
        let composer = composer("phpmd <php-src%,> xml", 10_000);
        assert!(composer.compose(&artifacts(3)).unwrap().is_empty());
    }

    #[test]
    fn test_split_invocations_fit_and_cover() {
        let source = "eslint -o <assessment-report> <javascript-src% >";
        let max_size = 200;
        let composer = composer(source, max_size);
        let set = artifacts(40);
        let invocations = composer.compose(&set).unwrap();
        assert!(invocations.len() > 1);

        let mut covered = Vec::new();
        for (i, inv) in invocations.iter().enumerate() {
            let id = format!("1-{}", i + 1);
            assert_eq!(inv.id, id);
            assert_eq!(
                inv.report_path,
                PathBuf::from(format!("/results/assessment_report{}.xml", id))
            );
            assert!(inv.command.rendered_len() <= max_size);
            assert_eq!(
                inv.command.rendered_len(),
                estimated_size(composer.template(), &composer.run_symbols(&inv.artifacts))
            );
            covered.extend(inv.artifacts.files("javascript-src").unwrap().to_vec());
        }
        assert_eq!(covered, set.files("javascript-src").unwrap());
    }

    #[test]
    fn test_tool_symbols_and_report_on_stdout() {
        let mut values = BTreeMap::new();
        values.insert("tool-dir".to_string(), "/opt/lint".to_string());
        values.insert("report-on-stdout".to_string(), "true".to_string());
        values.insert(
            "assessment-report-template".to_string(),
            "report-{}.json".to_string(),
        );
        let config = ToolConfig::from_values("/tools/lint", values);
        let composer = Composer::from_config(
            &config,
            Template::parse("<tool-dir>/bin/lint <srcfile% >").unwrap(),
            10_000,
            "/out",
        );
        let set = ArtifactSet::new("7")
            .with_category("srcfile", vec!["/a.rb".to_string()])
            .unwrap();
        let inv = composer.compose(&set).unwrap().remove(0);
        assert_eq!(inv.command.argv(), ["/opt/lint/bin/lint", "/a.rb"]);
        assert_eq!(inv.report_path, PathBuf::from("/out/report-7.json"));
        assert_eq!(inv.stdout_path, inv.report_path);
        assert_eq!(inv.working_dir, PathBuf::from("/out"));
    }

    #[test]
    fn test_profile_filter_can_make_run_inapplicable() {
        let composer = composer("lizard <srcfile% >", 10_000)
            .with_profile(ToolProfile::for_tool_type("lizard"));
        let set = ArtifactSet::new("1")
            .with_category("srcfile", vec!["/a.css".to_string(), "/b.xml".to_string()])
            .unwrap();
        assert!(composer.compose(&set).unwrap().is_empty());
    }

    #[test]
    fn test_split_needs_report_placeholder() {
        let layout = ReportLayout::new("/results").with_report_template("report.xml");
        let composer = Composer::new(
            Template::parse("eslint <javascript-src% >").unwrap(),
            120,
            layout,
        );
        let err = composer.compose(&artifacts(20)).unwrap_err();
        assert!(matches!(err, ComposeError::AmbiguousReportPath { .. }));
    }

    #[test]
    fn test_chunk_errors_propagate() {
        let composer = composer("eslint <javascript-src% >", 10);
        let err = composer.compose(&artifacts(2)).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::Chunk(ChunkError::FileExceedsBudget { .. })
        ));
    }
}
