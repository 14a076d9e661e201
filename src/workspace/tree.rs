//! Workspace → file tree conversion.
//!
//! A [`FileTree`] is the mounted shape of a workspace: one top-level root
//! directory containing the nested structure inferred from each entry's
//! slash-separated path, plus an injected `README.md` when the workspace
//! carries a readme. Trees are always regenerated from a workspace, never
//! hand-edited, and conversion is deterministic: the same workspace yields
//! a structurally identical tree every time.

use std::collections::BTreeMap;

use super::Workspace;

/// A node in the tree: a directory of named children, or a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Directory(BTreeMap<String, TreeNode>),
    File { contents: String },
}

/// The nested file structure for one workspace, rooted at a single
/// top-level directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTree {
    root: String,
    entries: BTreeMap<String, TreeNode>,
}

/// One materialization step, parents always before children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOp {
    Mkdir(String),
    Write { path: String, contents: String },
}

impl FileTree {
    pub const DEFAULT_ROOT: &'static str = "app";

    /// Build a tree from a workspace under the given root directory name.
    ///
    /// Leading slashes are stripped from entry paths; empty path segments
    /// are skipped. When two entries collide on a path the later entry
    /// wins, and a file in the way of a deeper path is replaced by a
    /// directory.
    pub fn from_workspace(workspace: &Workspace, root: impl Into<String>) -> Self {
        let mut entries = BTreeMap::new();

        for file in &workspace.files {
            let path = file.path.trim_start_matches('/');
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            let Some((leaf, parents)) = segments.split_last() else {
                continue;
            };

            let mut cursor = &mut entries;
            for segment in parents {
                let node = cursor
                    .entry(segment.to_string())
                    .and_modify(|n| {
                        if !matches!(n, TreeNode::Directory(_)) {
                            *n = TreeNode::Directory(BTreeMap::new());
                        }
                    })
                    .or_insert_with(|| TreeNode::Directory(BTreeMap::new()));
                let TreeNode::Directory(children) = node else {
                    unreachable!("non-directory nodes are replaced above");
                };
                cursor = children;
            }
            cursor.insert(
                leaf.to_string(),
                TreeNode::File {
                    contents: file.content.clone(),
                },
            );
        }

        if let Some(readme) = &workspace.readme {
            entries.insert(
                "README.md".to_string(),
                TreeNode::File {
                    contents: readme.clone(),
                },
            );
        }

        Self {
            root: root.into(),
            entries,
        }
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn entries(&self) -> &BTreeMap<String, TreeNode> {
        &self.entries
    }

    /// Whether a file with this name sits directly under the root.
    pub fn has_root_file(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(TreeNode::File { .. }))
    }

    pub fn file_count(&self) -> usize {
        fn count(children: &BTreeMap<String, TreeNode>) -> usize {
            children
                .values()
                .map(|node| match node {
                    TreeNode::File { .. } => 1,
                    TreeNode::Directory(children) => count(children),
                })
                .sum()
        }
        count(&self.entries)
    }

    /// Flatten into materialization steps: the root mkdir first, then each
    /// directory before anything inside it.
    pub fn flatten(&self) -> Vec<TreeOp> {
        fn walk(prefix: &str, children: &BTreeMap<String, TreeNode>, ops: &mut Vec<TreeOp>) {
            for (name, node) in children {
                let path = format!("{}/{}", prefix, name);
                match node {
                    TreeNode::Directory(children) => {
                        ops.push(TreeOp::Mkdir(path.clone()));
                        walk(&path, children, ops);
                    }
                    TreeNode::File { contents } => ops.push(TreeOp::Write {
                        path,
                        contents: contents.clone(),
                    }),
                }
            }
        }

        let mut ops = vec![TreeOp::Mkdir(self.root.clone())];
        walk(&self.root, &self.entries, &mut ops);
        ops
    }
}
