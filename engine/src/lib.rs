//! cmdsplit engine - templated tool invocations that fit the command line
//!
//! This crate turns an invocation template and a set of categorized source
//! files into concrete commands for a third-party tool, including:
//!
//! - A small token language for file lists, separators and conditional flags
//! - Exec (argument vector) and shell command forms
//! - Command size estimation against the host's `ARG_MAX`
//! - Recursive bisection of file lists that do not fit one command
//! - Per-tool profiles for filtering and split eligibility
//! - `tool.conf` parsing and engine settings
//!
//! # Example
//!
//! ```rust
//! use cmdsplit_engine::{ArtifactSet, Composer, ReportLayout, Template};
//!
//! let template = Template::parse("eslint -o <assessment-report> <javascript-src% >").unwrap();
//! let artifacts = ArtifactSet::new("1")
//!     .with_category("javascript-src", vec!["/pkg/a.js".to_owned()])
//!     .unwrap();
//!
//! let composer = Composer::new(template, 4096, ReportLayout::new("/results"));
//! let invocations = composer.compose(&artifacts).unwrap();
//! assert_eq!(invocations.len(), 1);
//! assert_eq!(
//!     invocations[0].command.argv(),
//!     ["eslint", "-o", "/results/assessment_report1.xml", "/pkg/a.js"]
//! );
//! ```

pub mod budget;
pub mod chunking;
pub mod classify;
pub mod compose;
pub mod config;
pub mod language;
pub mod profile;
pub mod template;
pub mod types;

pub use budget::{estimated_size, host_arg_max, CommandBudget};
pub use chunking::{split, Chunk, ChunkError, Chunker};
pub use classify::{
    is_applicable, target_variables, CategoryVocabulary, TargetClassifier, TargetVariable,
};
pub use compose::{ComposeError, Composer, Invocation, ReportLayout};
pub use config::{ConfigError, EngineSettings, ToolConfig};
pub use language::Language;
pub use profile::ToolProfile;
pub use template::{Command, CommandForm, LoadError, Template, TemplateError};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.chars().any(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_public_types_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template>();
        assert_send_sync::<ArtifactSet>();
        assert_send_sync::<ToolProfile>();
        assert_send_sync::<Chunker>();
        assert_send_sync::<Composer>();
        assert_send_sync::<ToolConfig>();
    }
}
