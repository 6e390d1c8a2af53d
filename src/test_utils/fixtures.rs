//! On-disk cookbook trees for tests.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory with a `cookbooks/` folder.
///
/// Every helper returns the path it wrote so tests can feed it straight into
/// the resolver or tree builder.
#[derive(Debug)]
pub struct CookbookFixture {
    root: TempDir,
}

impl CookbookFixture {
    /// Create an empty fixture.
    ///
    /// # Errors
    ///
    /// Fails if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let root = TempDir::new().context("Failed to create fixture directory")?;
        fs::create_dir_all(root.path().join("cookbooks"))?;
        Ok(Self {
            root,
        })
    }

    /// Fixture root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// The `cookbooks/` directory.
    #[must_use]
    pub fn cookbooks_dir(&self) -> PathBuf {
        self.root.path().join("cookbooks")
    }

    /// Directory of cookbook `name`.
    #[must_use]
    pub fn cookbook_dir(&self, name: &str) -> PathBuf {
        self.cookbooks_dir().join(name)
    }

    /// Write `content` to `relative` below the root, creating parents.
    ///
    /// # Errors
    ///
    /// Fails on any filesystem error.
    pub fn write(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Create cookbook `name` with a `metadata.rb`.
    ///
    /// # Errors
    ///
    /// Fails on any filesystem error.
    pub fn cookbook(&self, name: &str) -> Result<PathBuf> {
        self.write(
            &format!("cookbooks/{name}/metadata.rb"),
            &format!("name '{name}'\nversion '1.0.0'\n"),
        )?;
        Ok(self.cookbook_dir(name))
    }

    /// Write `recipes/{recipe}.rb` in cookbook `cookbook`.
    ///
    /// # Errors
    ///
    /// Fails on any filesystem error.
    pub fn recipe(&self, cookbook: &str, recipe: &str, content: &str) -> Result<PathBuf> {
        self.write(&format!("cookbooks/{cookbook}/recipes/{recipe}.rb"), content)
    }

    /// Write `attributes/default.rb` in cookbook `cookbook`.
    ///
    /// # Errors
    ///
    /// Fails on any filesystem error.
    pub fn attributes(&self, cookbook: &str, content: &str) -> Result<PathBuf> {
        self.write(&format!("cookbooks/{cookbook}/attributes/default.rb"), content)
    }

    /// Write `providers/{name}.rb` in cookbook `cookbook`.
    ///
    /// # Errors
    ///
    /// Fails on any filesystem error.
    pub fn provider(&self, cookbook: &str, name: &str, content: &str) -> Result<PathBuf> {
        self.write(&format!("cookbooks/{cookbook}/providers/{name}.rb"), content)
    }
}
