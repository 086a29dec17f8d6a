//! Path relativization for emitted rules.
//!
//! Every path in a rule is expressed relative to the emit root or through
//! a declared shell variable. The substitution table is consulted longest
//! prefix first, and the same rewrite applies to bare paths and to paths
//! buried in `-I…`/`-iquote…`/`-L…` prefixes, so no call site re-derives
//! the mapping.

use std::path::{Path, PathBuf};

const PATH_FLAG_PREFIXES: &[&str] = &["-iquote", "-I", "-L"];

#[derive(Debug, Clone)]
pub struct PathSubstitution {
    base: PathBuf,
    variables: Vec<(PathBuf, String)>,
}

impl PathSubstitution {
    /// `base` is the emit root; `variables` maps absolute roots to shell
    /// variable references (`/opt/utbot` -> `$(UTBOT_INSTALL_DIR)`).
    pub fn new(base: PathBuf, variables: impl IntoIterator<Item = (PathBuf, String)>) -> Self {
        let mut variables: Vec<(PathBuf, String)> = variables.into_iter().collect();
        // Longest prefix first, so nested roots win over their parents.
        variables.sort_by_key(|(root, _)| std::cmp::Reverse(root.components().count()));
        Self { base, variables }
    }

    /// Relativizes one path: variable roots first, then the emit root.
    /// Paths under neither are returned unchanged.
    pub fn relativize(&self, path: &Path) -> String {
        for (root, variable) in &self.variables {
            if let Ok(rel) = path.strip_prefix(root) {
                return if rel.as_os_str().is_empty() {
                    variable.clone()
                } else {
                    format!("{variable}/{}", rel.display())
                };
            }
        }
        if let Ok(rel) = path.strip_prefix(&self.base) {
            return if rel.as_os_str().is_empty() {
                ".".to_string()
            } else {
                rel.display().to_string()
            };
        }
        path.display().to_string()
    }

    /// Rewrites one command argument in place: absolute paths, and
    /// absolute paths behind the known path-carrying flag prefixes.
    pub fn rewrite_argument(&self, argument: &mut String) {
        if argument.starts_with('/') {
            *argument = self.relativize(Path::new(argument.as_str()));
            return;
        }
        for prefix in PATH_FLAG_PREFIXES {
            if let Some(rest) = argument.strip_prefix(prefix) {
                if rest.starts_with('/') {
                    *argument = format!("{prefix}{}", self.relativize(Path::new(rest)));
                }
                return;
            }
        }
    }
}
