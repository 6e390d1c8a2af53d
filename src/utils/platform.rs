//! Platform helpers.

/// Checks whether an executable is available on the search path.
///
/// Absolute or relative paths to an existing file are accepted as well, so
/// a config entry like `tools.chef = "/opt/chef-workstation/bin/chef"` works.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        #[cfg(unix)]
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely-not-a-real-command-cbscan"));
    }
}
