//! Name value objects accepted by the path resolver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::CbscanError;

/// A cookbook name such as `nginx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CookbookName(String);

impl CookbookName {
    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CookbookName {
    type Err = CbscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty()
            || name.contains("::")
            || name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(CbscanError::Other {
                message: format!("Invalid cookbook name: '{s}'"),
            });
        }
        Ok(Self(name.to_string()))
    }
}

impl fmt::Display for CookbookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recipe reference `cookbook::recipe`.
///
/// A bare cookbook name means its `default` recipe, and the run-list form
/// `recipe[cookbook::recipe]` is accepted too.
///
/// ```
/// use cbscan_cli::resolver::RecipeName;
///
/// let name: RecipeName = "recipe[nginx]".parse().unwrap();
/// assert_eq!(name.to_string(), "nginx::default");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipeName {
    /// Owning cookbook
    pub cookbook: CookbookName,
    /// Recipe file stem
    pub recipe: String,
}

impl RecipeName {
    /// Build from parts.
    #[must_use]
    pub const fn new(cookbook: CookbookName, recipe: String) -> Self {
        Self {
            cookbook,
            recipe,
        }
    }
}

impl FromStr for RecipeName {
    type Err = CbscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut text = s.trim();
        if let Some(inner) = text.strip_prefix("recipe[").and_then(|t| t.strip_suffix(']')) {
            text = inner.trim();
        }
        let (cookbook, recipe) = match text.split_once("::") {
            Some((cookbook, recipe)) => (cookbook, recipe.trim()),
            None => (text, "default"),
        };
        if recipe.is_empty() || recipe.contains("::") || recipe.contains('/') {
            return Err(CbscanError::Other {
                message: format!("Invalid recipe name: '{s}'"),
            });
        }
        Ok(Self {
            cookbook: cookbook.parse()?,
            recipe: recipe.to_string(),
        })
    }
}

impl fmt::Display for RecipeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.cookbook, self.recipe)
    }
}

/// A custom resource type name such as `nginx_site`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderName(String);

impl ProviderName {
    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Every `(cookbook, provider)` split at an underscore, left to right.
    ///
    /// `a_b_c` yields `(a, b_c)` then `(a_b, c)`. Splits with an empty side
    /// are skipped, so a name without underscores yields nothing.
    #[must_use]
    pub fn candidate_splits(&self) -> Vec<(String, String)> {
        self.0
            .match_indices('_')
            .map(|(i, _)| (&self.0[..i], &self.0[i + 1..]))
            .filter(|(cookbook, provider)| !cookbook.is_empty() && !provider.is_empty())
            .map(|(cookbook, provider)| (cookbook.to_string(), provider.to_string()))
            .collect()
    }
}

impl FromStr for ProviderName {
    type Err = CbscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CbscanError::Other {
                message: format!("Invalid resource type name: '{s}'"),
            });
        }
        Ok(Self(name.to_string()))
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipe_name_forms() {
        let full: RecipeName = "app::install".parse().unwrap();
        assert_eq!(full.cookbook.as_str(), "app");
        assert_eq!(full.recipe, "install");

        let bare: RecipeName = "app".parse().unwrap();
        assert_eq!(bare.to_string(), "app::default");

        let run_list: RecipeName = "recipe[app::install]".parse().unwrap();
        assert_eq!(run_list, full);
    }

    #[test]
    fn test_invalid_names() {
        assert!("".parse::<RecipeName>().is_err());
        assert!("app::".parse::<RecipeName>().is_err());
        assert!("a b::c".parse::<RecipeName>().is_err());
        assert!("nginx-site".parse::<ProviderName>().is_err());
        assert!("../x".parse::<CookbookName>().is_err());
    }

    #[test]
    fn test_candidate_splits() {
        let name: ProviderName = "a_b_c".parse().unwrap();
        assert_eq!(
            name.candidate_splits(),
            vec![
                ("a".to_string(), "b_c".to_string()),
                ("a_b".to_string(), "c".to_string())
            ]
        );

        let name: ProviderName = "nginx_site".parse().unwrap();
        assert_eq!(name.candidate_splits(), vec![("nginx".to_string(), "site".to_string())]);

        let trailing: ProviderName = "nginx_".parse().unwrap();
        assert!(trailing.candidate_splits().is_empty());
        let plain: ProviderName = "service".parse().unwrap();
        assert!(plain.candidate_splits().is_empty());
    }
}
