//! Execution trees.
//!
//! [`TreeBuilder`] expands an entry recipe into an [`ExecutionNode`] tree by
//! following includes through the path resolver; [`render`] turns the result
//! into the ASCII form consumed as prompt context, or into JSON.

pub mod builder;
pub mod node;
pub mod render;

pub use builder::{TreeBuilder, TreeOptions, recipe_display_name};
pub use node::{ExecutionNode, NodeKind};
pub use render::{depth_profile, render_json, render_tree, render_tree_with_depth};
