//! Project manifest (package.json) reading and script resolution.
//!
//! The manifest's `scripts` table is the only part runbar interprets; the
//! command strings themselves are opaque and handed to the package manager
//! untouched.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use serde::Deserialize;

/// A named script from the manifest's `scripts` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectScript {
    pub name: String,
    pub command: String,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    scripts: Option<BTreeMap<String, String>>,
}

/// Reads `<project>/package.json` and returns its scripts in name order.
///
/// Aborting conditions, reported as errors for the command boundary to show:
/// missing file ("not a valid Node project"), unparsable JSON, or an empty
/// script table.
pub fn load_scripts(project_dir: &Path) -> Result<Vec<ProjectScript>> {
    let manifest_path = project_dir.join("package.json");
    let raw = match std::fs::read_to_string(&manifest_path) {
        Ok(raw) => raw,
        Err(_) => bail!(
            "{} is not a valid Node project (no package.json)",
            project_dir.display()
        ),
    };
    let manifest: PackageManifest = match serde_json::from_str(&raw) {
        Ok(manifest) => manifest,
        Err(err) => bail!("cannot parse {}: {}", manifest_path.display(), err),
    };
    let scripts: Vec<ProjectScript> = manifest
        .scripts
        .unwrap_or_default()
        .into_iter()
        .map(|(name, command)| ProjectScript { name, command })
        .collect();
    if scripts.is_empty() {
        bail!("no scripts defined in {}", manifest_path.display());
    }
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project_with(manifest: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), manifest).unwrap();
        dir
    }

    #[test]
    fn missing_manifest_is_not_a_project() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_scripts(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a valid Node project"));
    }

    #[test]
    fn garbage_manifest_reports_parse_failure() {
        let dir = project_with("{ scripts: nope");
        let err = load_scripts(dir.path()).unwrap_err();
        assert!(err.to_string().contains("cannot parse"));
    }

    #[test]
    fn empty_script_table_aborts() {
        let dir = project_with(r#"{"scripts":{}}"#);
        let err = load_scripts(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no scripts defined"));
    }

    #[test]
    fn absent_script_table_aborts_too() {
        let dir = project_with(r#"{"name":"demo"}"#);
        let err = load_scripts(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no scripts defined"));
    }

    #[test]
    fn single_script_is_returned() {
        let dir = project_with(r#"{"scripts":{"dev":"vite"}}"#);
        let scripts = load_scripts(dir.path()).unwrap();
        assert_eq!(
            scripts,
            vec![ProjectScript {
                name: "dev".into(),
                command: "vite".into(),
            }]
        );
    }

    #[test]
    fn scripts_come_back_in_name_order() {
        let dir = project_with(r#"{"scripts":{"test":"jest","build":"tsc","dev":"vite"}}"#);
        let names: Vec<String> = load_scripts(dir.path())
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["build", "dev", "test"]);
    }
}
