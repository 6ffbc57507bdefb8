//! Project registry: name -> indexed root directory, persisted at
//! `~/.qgrep/projects.toml` (or `$QGREP_HOME/projects.toml`). The CORE has
//! no notion of a "project" at all — this is pure CLI-layer bookkeeping,
//! the way `DevsHero-NeuroSiphon` resolves its own config with `serde` +
//! `toml` + `dirs`.

use qgrep_core::{QgrepError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub root: PathBuf,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ProjectsFile {
    #[serde(default)]
    projects: BTreeMap<String, ProjectEntry>,
}

/// `~/.qgrep`, or `$QGREP_HOME` if set.
pub fn qgrep_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("QGREP_HOME") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(".qgrep"))
        .ok_or_else(|| QgrepError::Io(io::Error::other("cannot determine home directory")))
}

fn projects_file_path() -> Result<PathBuf> {
    Ok(qgrep_home()?.join("projects.toml"))
}

/// The `.qgd`/`.qgf`/`.qgc` triple for a project lives together under the
/// qgrep home, named after the project.
pub fn store_path(name: &str) -> Result<PathBuf> {
    Ok(qgrep_home()?.join(format!("{name}.qgd")))
}

pub fn load_all() -> Result<BTreeMap<String, ProjectEntry>> {
    let path = projects_file_path()?;
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(&path)?;
    let parsed: ProjectsFile =
        toml::from_str(&text).map_err(|e| QgrepError::Io(io::Error::other(e.to_string())))?;
    Ok(parsed.projects)
}

fn save_all(projects: &BTreeMap<String, ProjectEntry>) -> Result<()> {
    let home = qgrep_home()?;
    std::fs::create_dir_all(&home)?;
    let file = ProjectsFile {
        projects: projects.clone(),
    };
    let text =
        toml::to_string_pretty(&file).map_err(|e| QgrepError::Io(io::Error::other(e.to_string())))?;
    std::fs::write(projects_file_path()?, text)?;
    Ok(())
}

/// `init <name> <root>`: registers the project, creating `~/.qgrep` if
/// needed. Overwrites an existing entry with the same name.
pub fn register(name: &str, root: &Path) -> Result<()> {
    let mut projects = load_all()?;
    projects.insert(
        name.to_string(),
        ProjectEntry {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
        },
    );
    save_all(&projects)
}

pub fn root_of(name: &str) -> Result<PathBuf> {
    let projects = load_all()?;
    projects
        .get(name)
        .map(|e| e.root.clone())
        .ok_or_else(|| QgrepError::Io(io::Error::other(format!("unknown project '{name}'"))))
}

/// Expands a project-list token: `*`/`%` means every
/// registered project, otherwise a comma-separated list of names.
pub fn resolve_list(token: &str) -> Result<Vec<String>> {
    if token == "*" || token == "%" {
        let projects = load_all()?;
        return Ok(projects.keys().cloned().collect());
    }
    Ok(token.split(',').map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_list_splits_on_comma() {
        let names = resolve_list("a,b,c").unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
