//! Repository flattening.
//!
//! [`WalkFlattener`] renders a repository as one text document: a directory
//! tree followed by every readable text file wrapped in `<content>` tags.
//! The walk respects `.gitignore` and friends via the [`ignore`] crate and
//! applies the extra gitignore-style patterns from `--repo-ignore`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;

use super::ContextError;
use crate::constants::{BINARY_DETECTION_BYTES, FLATTEN_MAX_FILE_SIZE};

/// Turns a repository into a single text rendering.
pub trait RepoFlattener {
    fn flatten(&self, root: &Path, ignore_patterns: &[String]) -> Result<String, ContextError>;
}

/// Flattener backed by a gitignore-aware directory walk.
pub struct WalkFlattener {
    max_file_size: u64,
}

impl WalkFlattener {
    pub fn new() -> Self {
        Self {
            max_file_size: FLATTEN_MAX_FILE_SIZE,
        }
    }
}

impl RepoFlattener for WalkFlattener {
    fn flatten(&self, root: &Path, ignore_patterns: &[String]) -> Result<String, ContextError> {
        let rules = Arc::new(IgnoreRules::parse(root, ignore_patterns)?);
        let entries = walk(root, rules);

        let mut tree = TreeNode::default();
        let mut files = Vec::new();
        for (relative, is_dir) in &entries {
            tree.insert(relative);
            if !is_dir {
                files.push(relative.clone());
            }
        }

        let root_name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| root.display().to_string());

        let mut out = String::new();
        out.push_str(&format!("Directory: {}\n\n", root_name));
        out.push_str("Directory Structure:\n<directory_structure>\n.\n");
        tree.render("", &mut out);
        out.push_str("</directory_structure>\n");

        for relative in files {
            let Some(content) = self.read_text(&root.join(&relative)) else {
                tracing::debug!(path = %relative, "skipping unreadable or binary file");
                continue;
            };
            out.push_str(&format!("\n<content full_path=\"{}\">\n", relative));
            out.push_str(&content);
            if !content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("</content>\n");
        }

        Ok(out)
    }
}

impl WalkFlattener {
    /// Reads a file as UTF-8 text; `None` for large, binary or non-UTF-8 files.
    fn read_text(&self, path: &Path) -> Option<String> {
        let metadata = fs::metadata(path).ok()?;
        if metadata.len() > self.max_file_size {
            return None;
        }
        let bytes = fs::read(path).ok()?;
        let check_len = bytes.len().min(BINARY_DETECTION_BYTES);
        if bytes[..check_len].contains(&0) {
            return None;
        }
        String::from_utf8(bytes).ok()
    }
}

/// Walks `root`, returning `(relative path, is_dir)` pairs in sorted order.
fn walk(root: &Path, rules: Arc<IgnoreRules>) -> Vec<(String, bool)> {
    let filter_root = root.to_path_buf();
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(true)
        .hidden(false)
        .parents(false)
        .require_git(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            if entry.file_name() == ".git" {
                return false;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            match relative_path(&filter_root, entry.path()) {
                Some(relative) => !rules.is_ignored(&relative, is_dir),
                None => true,
            }
        });

    let mut entries = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let Some(relative) = relative_path(root, entry.path()) else {
            continue;
        };
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        entries.push((relative, is_dir));
    }
    entries
}

/// Path of `path` under `root` with `/` separators.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Extra patterns from `--repo-ignore`, matched with gitignore semantics.
///
/// A leading `/` or an inner `/` anchors the pattern to the repository
/// root, `*` stops at `/`, a trailing `/` limits it to directories and `!`
/// re-includes what an earlier pattern excluded.
struct IgnoreRules {
    matcher: Gitignore,
}

impl IgnoreRules {
    fn parse(root: &Path, patterns: &[String]) -> Result<Self, ContextError> {
        let mut builder = GitignoreBuilder::new(root);
        for raw in patterns {
            builder
                .add_line(None, raw)
                .map_err(|e| invalid_pattern(raw, e))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| invalid_pattern(&patterns.join(" "), e))?;
        Ok(Self { matcher })
    }

    /// `relative` uses `/` separators; an ignored parent ignores the entry.
    fn is_ignored(&self, relative: &str, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(Path::new(relative), is_dir)
            .is_ignore()
    }
}

fn invalid_pattern(pattern: &str, err: ignore::Error) -> ContextError {
    ContextError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    }
}

/// Directory tree built from walked paths, rendered like `tree`.
#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn insert(&mut self, relative: &str) {
        let mut node = self;
        for part in relative.split('/') {
            node = node.children.entry(part.to_string()).or_default();
        }
    }

    fn render(&self, prefix: &str, out: &mut String) {
        let count = self.children.len();
        for (i, (name, child)) in self.children.iter().enumerate() {
            let last = i + 1 == count;
            out.push_str(prefix);
            out.push_str(if last { "└── " } else { "├── " });
            out.push_str(name);
            out.push('\n');
            let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
            child.render(&child_prefix, out);
        }
    }
}
