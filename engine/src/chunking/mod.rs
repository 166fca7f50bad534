//! Size-constrained splitting of artifact sets
//!
//! When a tool's command would exceed the host limit, each target category
//! is bisected until every resulting invocation fits. Chunks are new artifact
//! sets; the parent is never modified.

use serde::Serialize;
use thiserror::Error;

use crate::budget::estimated_size;
use crate::classify::target_variables;
use crate::profile::ToolProfile;
use crate::template::Template;
use crate::types::{ArtifactSet, SymbolTable};

/// Splitting failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error(
        "File '{path}' in '{category}' cannot fit on a command line: \
         a chunk holding only this file needs {size} bytes, budget is {max_size}"
    )]
    FileExceedsBudget {
        category: String,
        path: String,
        size: usize,
        max_size: usize,
    },

    #[error("Command without any target files needs {overhead} bytes, budget is {max_size}")]
    OverheadExceedsBudget { overhead: usize, max_size: usize },

    #[error("Category '{category}' may not be split and needs {size} bytes, budget is {max_size}")]
    CategoryNotSplittable {
        category: String,
        size: usize,
        max_size: usize,
    },

    #[error("Command needs {size} bytes, budget is {max_size}, and it references no target files")]
    NoTargetFiles { size: usize, max_size: usize },
}

/// One unit of work produced by the chunker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Artifact set this chunk's invocation runs on
    pub artifacts: ArtifactSet,
    /// Category this chunk carries a slice of; `None` when nothing was split
    pub category: Option<String>,
}

impl Chunk {
    fn whole(artifacts: ArtifactSet) -> Self {
        Self {
            artifacts,
            category: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.artifacts.id
    }

    /// Files of the split category, if this chunk came from a split
    pub fn files(&self) -> Option<&[String]> {
        self.category
            .as_deref()
            .and_then(|c| self.artifacts.files(c))
    }
}

/// Splits artifact sets against a fixed command size budget
#[derive(Debug, Clone)]
pub struct Chunker {
    max_size: usize,
    profile: ToolProfile,
}

impl Chunker {
    /// Create a chunker with the default profile
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            profile: ToolProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: ToolProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn profile(&self) -> &ToolProfile {
        &self.profile
    }

    /// Split using the artifact set's own symbols
    pub fn split(
        &self,
        artifacts: &ArtifactSet,
        template: &Template,
    ) -> Result<Vec<Chunk>, ChunkError> {
        self.split_with(artifacts, template, ArtifactSet::symbols)
    }

    /// Split, measuring each candidate with the symbols `symbols` builds for it
    ///
    /// Callers that add run-level symbols (report paths, tool configuration)
    /// pass them in here so the fit test sees the final command.
    pub fn split_with<F>(
        &self,
        artifacts: &ArtifactSet,
        template: &Template,
        symbols: F,
    ) -> Result<Vec<Chunk>, ChunkError>
    where
        F: Fn(&ArtifactSet) -> SymbolTable,
    {
        let measure = |set: &ArtifactSet| estimated_size(template, &symbols(set));

        let full = measure(artifacts);
        if full <= self.max_size {
            log::debug!(
                "{}: {} bytes fits budget {}, no split",
                artifacts.id,
                full,
                self.max_size
            );
            return Ok(vec![Chunk::whole(artifacts.clone())]);
        }

        // categories that only drive conditionals stay whole in every chunk
        let targets = target_variables(template, self.profile.classifier());
        let target_names: Vec<&str> = targets
            .iter()
            .filter(|t| t.listed)
            .map(|t| t.name.as_str())
            .collect();
        let present: Vec<&str> = target_names
            .iter()
            .copied()
            .filter(|name| artifacts.has_files(name))
            .collect();
        if present.is_empty() {
            return Err(ChunkError::NoTargetFiles {
                size: full,
                max_size: self.max_size,
            });
        }

        let overhead = measure(&artifacts.without(&target_names));
        if overhead > self.max_size {
            return Err(ChunkError::OverheadExceedsBudget {
                overhead,
                max_size: self.max_size,
            });
        }

        log::debug!(
            "{}: {} bytes exceeds budget {} (overhead {}), splitting {}",
            artifacts.id,
            full,
            self.max_size,
            overhead,
            present.join(", ")
        );

        // every chunk is measured under the longest id any chunk can get
        let max_chunks: usize = present
            .iter()
            .filter_map(|name| artifacts.files(name))
            .map(<[String]>::len)
            .sum();
        let trial_id = format!("{}-{}", artifacts.id, max_chunks);

        let mut chunks = Vec::new();
        for category in present {
            let files = artifacts.files(category).unwrap_or_default();
            let candidate = |slice: &[String]| {
                artifacts.derive(trial_id.clone(), category, slice.to_vec(), &target_names)
            };
            let fits = |slice: &[String]| measure(&candidate(slice)) <= self.max_size;

            let leaves = if self.profile.is_splittable(category) {
                let mut leaves = Vec::new();
                bisect(files, &fits, &mut leaves).map_err(|path| {
                    ChunkError::FileExceedsBudget {
                        category: category.to_owned(),
                        path: path.to_owned(),
                        size: measure(&candidate(std::slice::from_ref(path))),
                        max_size: self.max_size,
                    }
                })?;
                leaves
            } else if fits(files) {
                vec![files]
            } else {
                return Err(ChunkError::CategoryNotSplittable {
                    category: category.to_owned(),
                    size: measure(&candidate(files)),
                    max_size: self.max_size,
                });
            };

            log::debug!(
                "{}: {} files of {} in {} chunks",
                artifacts.id,
                files.len(),
                category,
                leaves.len()
            );

            for leaf in leaves {
                let id = format!("{}-{}", artifacts.id, chunks.len() + 1);
                chunks.push(Chunk {
                    artifacts: artifacts.derive(id, category, leaf.to_vec(), &target_names),
                    category: Some(category.to_owned()),
                });
            }
        }

        Ok(chunks)
    }
}

/// Split `artifacts` so every invocation of `template` fits `max_size`
pub fn split(
    artifacts: &ArtifactSet,
    template: &Template,
    max_size: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    Chunker::new(max_size).split(artifacts, template)
}

/// Halve `files` at `len / 2` until every piece fits, left to right
///
/// Fails with the offending path when a single file does not fit.
fn bisect<'a>(
    files: &'a [String],
    fits: &dyn Fn(&[String]) -> bool,
    leaves: &mut Vec<&'a [String]>,
) -> Result<(), &'a String> {
    if files.is_empty() {
        return Ok(());
    }
    if fits(files) {
        leaves.push(files);
        return Ok(());
    }
    if let [single] = files {
        return Err(single);
    }
    let (left, right) = files.split_at(files.len() / 2);
    bisect(left, fits, leaves)?;
    bisect(right, fits, leaves)
}
