//! Extraction of embedded source files from model-authored markdown.
//!
//! Models announce files in several overlapping ways. Each convention is a [`FileMatcher`]
//! that scans the whole answer on its own; [`FileExtractor`] runs them in a fixed order and
//! folds every candidate into one [`FileSet`], so a later matcher overwrites a path an
//! earlier matcher produced.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use crate::error::Result;

/// Mapping of relative file path to file content, built fresh for every answer.
pub type FileSet = BTreeMap<String, String>;

/// Extensions accepted by the bold-heading matcher restricted to known source files.
pub const KNOWN_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "py", "css", "html", "json", "md"];

/// A single (path, content) candidate found in an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: String,
    pub content: String,
}

/// One markdown convention for embedding a file in an answer.
pub trait FileMatcher: Send + Sync {
    fn name(&self) -> &str;

    /// Scan the whole text and return candidates in order of appearance.
    fn scan(&self, text: &str) -> Vec<ExtractedFile>;
}

/// A matcher driven by a regex whose first group is the path and second group the body.
///
/// Bodies are matched lazily up to the nearest closing fence, so an unterminated fence
/// yields nothing and a nested fence ends the block early.
pub struct FencePattern {
    name: &'static str,
    regex: Regex,
}

impl FencePattern {
    pub fn new(name: &'static str, pattern: &str) -> Result<Self> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
        })
    }

    /// ```` ```lang:title=path ```` on the opening fence.
    pub fn inline_title() -> Result<Self> {
        Self::new("inline-title", r"(?s)```[a-zA-Z0-9]*:title=([^`\n]+?)\n(.*?)```")
    }

    /// A `// filename: path` (or `# filename: path`) comment as the first line of the body.
    pub fn comment_filename() -> Result<Self> {
        Self::new(
            "comment-filename",
            r"(?s)```[a-zA-Z0-9]+\n(?://|#)[ \t]*filename:[ \t]*([^\n]+)\n(.*?)```",
        )
    }

    /// `**path**` on the line right above the fence.
    pub fn bold_heading() -> Result<Self> {
        Self::new("bold-heading", r"(?s)\*\*([^*\n]+?)\*\*\n```[a-zA-Z0-9]*\n(.*?)```")
    }

    /// Same as [`FencePattern::bold_heading`], limited to [`KNOWN_EXTENSIONS`].
    pub fn bold_heading_known_extension() -> Result<Self> {
        let pattern = format!(
            r"(?s)\*\*([^*\n]+\.(?:{}))\*\*\n```[a-zA-Z0-9]*\n(.*?)```",
            KNOWN_EXTENSIONS.join("|")
        );
        Self::new("bold-heading-known-extension", &pattern)
    }
}

impl FileMatcher for FencePattern {
    fn name(&self) -> &str {
        self.name
    }

    fn scan(&self, text: &str) -> Vec<ExtractedFile> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let path = caps.get(1)?.as_str().trim();
                let content = caps.get(2)?.as_str().trim();
                if path.is_empty() {
                    return None;
                }
                Some(ExtractedFile {
                    path: path.to_string(),
                    content: content.to_string(),
                })
            })
            .collect()
    }
}

/// Ordered list of matchers folded into a single [`FileSet`].
pub struct FileExtractor {
    matchers: Vec<Box<dyn FileMatcher>>,
}

impl FileExtractor {
    /// The four conventions in their precedence order.
    pub fn standard() -> Result<Self> {
        Ok(Self::with_matchers(vec![
            Box::new(FencePattern::inline_title()?),
            Box::new(FencePattern::comment_filename()?),
            Box::new(FencePattern::bold_heading()?),
            Box::new(FencePattern::bold_heading_known_extension()?),
        ]))
    }

    pub fn with_matchers(matchers: Vec<Box<dyn FileMatcher>>) -> Self {
        Self { matchers }
    }

    pub fn extract(&self, text: &str) -> FileSet {
        let mut files = FileSet::new();

        for matcher in &self.matchers {
            for file in matcher.scan(text) {
                if let Some(previous) = files.insert(file.path.clone(), file.content) {
                    if previous != files[&file.path] {
                        debug!("{} overwrote earlier content for {}", matcher.name(), file.path);
                    }
                }
            }
        }

        files
    }
}
