//! Text and JSON renderings of an execution tree.
//!
//! The text form is the one handed to downstream prompts:
//!
//! ```text
//! web::default
//! ├── cache::default
//! │   └── package[redis]
//! └── service[web]
//! ```
//!
//! The root has no connector; every other line is a run of four-character
//! indent groups (`│   ` or four spaces) followed by `├── ` or `└── `.

use anyhow::{Context, Result};

use super::node::ExecutionNode;

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const PIPE_INDENT: &str = "│   ";
const SPACE_INDENT: &str = "    ";

/// Render the whole tree.
#[must_use]
pub fn render_tree(root: &ExecutionNode) -> String {
    render(root, None)
}

/// Render down to `max_depth`; deeper subtrees are summarized as
/// `[N more]` on their last visible ancestor.
#[must_use]
pub fn render_tree_with_depth(root: &ExecutionNode, max_depth: usize) -> String {
    render(root, Some(max_depth))
}

fn render(root: &ExecutionNode, max_depth: Option<usize>) -> String {
    let mut out = String::new();
    // (node, indent prefix, is last sibling, depth)
    let mut stack: Vec<(&ExecutionNode, String, bool, usize)> = vec![(root, String::new(), true, 0)];

    while let Some((node, prefix, is_last, depth)) = stack.pop() {
        let mut line = node.label();
        let cut = max_depth.is_some_and(|max| depth >= max) && !node.children.is_empty();
        if cut {
            line.push_str(&format!(" [{} more]", node.node_count() - 1));
        }

        let child_prefix = if depth == 0 {
            out.push_str(&line);
            String::new()
        } else {
            out.push_str(&prefix);
            out.push_str(if is_last { LAST_BRANCH } else { BRANCH });
            out.push_str(&line);
            format!("{prefix}{}", if is_last { SPACE_INDENT } else { PIPE_INDENT })
        };
        out.push('\n');

        if cut {
            continue;
        }
        let count = node.children.len();
        for (i, child) in node.children.iter().enumerate().rev() {
            stack.push((child, child_prefix.clone(), i + 1 == count, depth + 1));
        }
    }
    out
}

/// Pretty-printed JSON of the tree.
///
/// # Errors
///
/// Fails only if serialization fails.
pub fn render_json(root: &ExecutionNode) -> Result<String> {
    serde_json::to_string_pretty(root).context("Failed to serialize execution tree")
}

/// Depth of every line of a text rendering.
///
/// Reads the indent groups and connector at the start of each line; a line
/// without a connector is a root.
#[must_use]
pub fn depth_profile(text: &str) -> Vec<usize> {
    text.lines()
        .map(|line| {
            let mut rest = line;
            let mut depth = 0;
            while let Some(after) =
                rest.strip_prefix(PIPE_INDENT).or_else(|| rest.strip_prefix(SPACE_INDENT))
            {
                depth += 1;
                rest = after;
            }
            if rest.starts_with(BRANCH) || rest.starts_with(LAST_BRANCH) {
                depth + 1
            } else {
                0
            }
        })
        .collect()
}
