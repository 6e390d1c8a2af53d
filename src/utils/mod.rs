//! Cross-cutting utilities: directory operations, executable lookup and the
//! progress spinner.

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{copy_dir, ensure_dir, normalize_path, remove_dir_all};
pub use platform::command_exists;
pub use progress::Spinner;
