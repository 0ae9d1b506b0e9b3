//! Package manager detection.
//!
//! Probes a project directory for lockfiles and picks the matching package
//! manager. Absence of every lockfile is a normal case and falls back to npm.

use std::path::Path;

/// The package manager used to invoke project scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Yarn,
    Pnpm,
    Npm,
}

impl PackageManager {
    /// Executable name as invoked through the shell.
    pub fn command(&self) -> &'static str {
        match self {
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Npm => "npm",
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}

/// Picks the package manager for a project directory.
///
/// Probes lockfiles in priority order: yarn > pnpm > npm. No side effects;
/// a directory with no lockfiles simply yields npm.
pub fn detect_package_manager(project_dir: &Path) -> PackageManager {
    if project_dir.join("yarn.lock").exists() {
        PackageManager::Yarn
    } else if project_dir.join("pnpm-lock.yaml").exists()
        || project_dir.join("pnpm.lock").exists()
    {
        PackageManager::Pnpm
    } else {
        // package-lock.json and "no lockfile at all" both mean npm.
        PackageManager::Npm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn defaults_to_npm_without_lockfiles() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_package_manager(dir.path()), PackageManager::Npm);
    }

    #[test]
    fn package_lock_selects_npm() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "package-lock.json");
        assert_eq!(detect_package_manager(dir.path()), PackageManager::Npm);
    }

    #[test]
    fn pnpm_lock_selects_pnpm() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pnpm-lock.yaml");
        touch(dir.path(), "package-lock.json");
        assert_eq!(detect_package_manager(dir.path()), PackageManager::Pnpm);
    }

    #[test]
    fn yarn_wins_over_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "yarn.lock");
        touch(dir.path(), "pnpm-lock.yaml");
        touch(dir.path(), "package-lock.json");
        assert_eq!(detect_package_manager(dir.path()), PackageManager::Yarn);
    }

    #[test]
    fn legacy_pnpm_lock_name_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pnpm.lock");
        assert_eq!(detect_package_manager(dir.path()), PackageManager::Pnpm);
    }
}
