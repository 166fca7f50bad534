//! Source languages and the artifact category names derived from them
//!
//! Every supported language owns one category, `{language}-src`, holding the
//! files of that language. The catch-all category [`ALL_SOURCE_FILES`] holds
//! the files of every language.

/// Generic "all source files" category
pub const ALL_SOURCE_FILES: &str = "srcfile";

/// Suffix that turns a language name into its category name
pub const CATEGORY_SUFFIX: &str = "-src";

/// Supported source languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    Html,
    Css,
    Xml,
    Php,
    Perl,
    Python2,
    Python3,
    Ruby,
    DotNet,
}

impl Language {
    pub const ALL: [Self; 10] = [
        Self::JavaScript,
        Self::Html,
        Self::Css,
        Self::Xml,
        Self::Php,
        Self::Perl,
        Self::Python2,
        Self::Python3,
        Self::Ruby,
        Self::DotNet,
    ];

    /// Get language name as used in category names
    pub fn name(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Html => "html",
            Self::Css => "css",
            Self::Xml => "xml",
            Self::Php => "php",
            Self::Perl => "perl",
            Self::Python2 => "python-2",
            Self::Python3 => "python-3",
            Self::Ruby => "ruby",
            Self::DotNet => "dotnet",
        }
    }

    /// File extensions (with leading dot) belonging to the language
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::JavaScript => &[".js"],
            Self::Html => &[".html", ".htm"],
            Self::Css => &[".css"],
            Self::Xml => &[".xml"],
            Self::Php => &[".php"],
            Self::Perl => &[".pl", ".pm"],
            Self::Python2 | Self::Python3 => &[".py"],
            Self::Ruby => &[".rb"],
            Self::DotNet => &[".cs"],
        }
    }

    /// Category name holding this language's files
    pub fn category(&self) -> String {
        format!("{}{}", self.name(), CATEGORY_SUFFIX)
    }

    /// Look up a language by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.name() == name)
    }

    /// Look up the language owning a category name
    pub fn from_category(category: &str) -> Option<Self> {
        category
            .strip_suffix(CATEGORY_SUFFIX)
            .and_then(Self::from_name)
    }
}

/// Whether `name` is a per-language category such as `php-src`
pub fn is_language_category(name: &str) -> bool {
    Language::from_category(name).is_some()
}

/// Whether `name` holds source file paths rather than free-form values
pub fn is_file_category(name: &str) -> bool {
    name == ALL_SOURCE_FILES || is_language_category(name)
}
