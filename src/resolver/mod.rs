//! Stateless path resolution for recipes, providers and attribute files.
//!
//! Callers pass a name value object and an ordered list of candidate
//! directories (local cookbooks first, then fetched dependencies). Nothing
//! is cached; every call reads the filesystem.

pub mod names;
pub mod path;

pub use names::{CookbookName, ProviderName, RecipeName};
pub use path::{
    matches_cookbook, resolve_attributes_path, resolve_cookbook_dir, resolve_provider_path,
    resolve_recipe_path,
};
