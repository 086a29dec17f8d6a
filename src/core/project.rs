//! Project context and the path mapping between the user's build tree and
//! the instrumented (recompiled) tree.
//!
//! Every artifact the plan produces is the image of an original project
//! file under `ProjectContext::recompiled_of`; stubs, wrappers and
//! generated tests live in parallel subtrees under the test directory.

use std::path::{Path, PathBuf};

const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx"];
const CXX_EXTENSIONS: &[&str] = &["cc", "cpp", "cxx"];
const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx"];

/// Roots the generator works against. All paths are absolute.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Root of the user's source tree.
    pub project_path: PathBuf,
    /// The user's build tree, where the compilation database was recorded.
    pub build_dir: PathBuf,
    /// Root of generated tests, stubs and wrapper sources.
    pub test_dir: PathBuf,
    /// Root of the instrumented parallel tree the plan builds into.
    pub recompiled_root: PathBuf,
    /// Bundled runner library (googletest) root.
    pub runner_dir: PathBuf,
    /// Header-only private-access shim injected for C++ test sources.
    pub access_private_dir: PathBuf,
}

impl ProjectContext {
    /// Path of `file` relative to whichever known root contains it. Files
    /// outside every root keep only their file name, so the recompiled
    /// tree never escapes its own root.
    pub fn rel_under(&self, file: &Path) -> PathBuf {
        for root in [&self.project_path, &self.build_dir, &self.test_dir] {
            if let Ok(rel) = file.strip_prefix(root) {
                return rel.to_path_buf();
            }
        }
        PathBuf::from(file.file_name().unwrap_or(file.as_os_str()))
    }

    /// Image of an original file in the instrumented tree. Sources map to
    /// their future object file (`a.c` -> `<root>/a.c.o`); objects,
    /// libraries and executables keep their name.
    pub fn recompiled_of(&self, file: &Path) -> PathBuf {
        let rel = self.rel_under(file);
        if is_source_file(file) {
            self.recompiled_root.join(add_extension(&rel, ".o"))
        } else {
            self.recompiled_root.join(rel)
        }
    }

    /// Generated stub source replacing `source` (`a.c` -> `stubs/a_stub.c`).
    pub fn source_to_stub_path(&self, source: &Path) -> PathBuf {
        let rel = self.rel_under(source);
        self.test_dir.join("stubs").join(add_suffix(&rel, "_stub"))
    }

    /// Inverse of [`Self::source_to_stub_path`].
    pub fn stub_to_source_path(&self, stub: &Path) -> PathBuf {
        let rel = match stub.strip_prefix(self.test_dir.join("stubs")) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => self.rel_under(stub),
        };
        self.project_path.join(remove_suffix(&rel, "_stub"))
    }

    /// Wrapper source compiled in place of a non-C++ translation unit.
    pub fn wrapper_path(&self, source: &Path) -> PathBuf {
        let rel = self.rel_under(source);
        self.test_dir.join("wrapper").join(add_suffix(&rel, "_wrapper"))
    }

    /// Generated test source for `source` (`a.c` -> `<tests>/a_test.cpp`).
    pub fn source_to_test_path(&self, source: &Path) -> PathBuf {
        let rel = self.rel_under(source);
        let named = rel.with_file_name(format!(
            "{}_test.cpp",
            rel.file_stem().unwrap_or_default().to_string_lossy()
        ));
        self.test_dir.join(named)
    }

    /// The test executable is the recompiled image of the test source with
    /// both trailing extensions removed (`a_test.cpp.o` -> `a_test`).
    pub fn test_executable_path(&self, source: &Path) -> PathBuf {
        let recompiled = self.recompiled_of(&self.source_to_test_path(source));
        remove_extension(&remove_extension(&recompiled))
    }
}

/// Appends `ext` after the existing extension (`a.c` + `.o` -> `a.c.o`).
pub fn add_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(ext);
    PathBuf::from(name)
}

/// Removes the last extension, if any.
pub fn remove_extension(path: &Path) -> PathBuf {
    path.with_extension("")
}

/// Inserts `suffix` before the extension (`libx.a` + `_mixed` -> `libx_mixed.a`).
pub fn add_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let named = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(named)
}

fn remove_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let stem = stem.strip_suffix(suffix).unwrap_or(&stem);
    let named = match path.extension() {
        Some(ext) => format!("{stem}.{}", ext.to_string_lossy()),
        None => stem.to_string(),
    };
    path.with_file_name(named)
}

fn has_extension_in(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn is_source_file(path: &Path) -> bool {
    has_extension_in(path, SOURCE_EXTENSIONS)
}

pub fn is_cxx_file(path: &Path) -> bool {
    has_extension_in(path, CXX_EXTENSIONS)
}

pub fn is_header_file(path: &Path) -> bool {
    has_extension_in(path, HEADER_EXTENSIONS)
}

pub fn is_object_file(path: &Path) -> bool {
    has_extension_in(path, &["o"])
}

pub fn is_static_library_file(path: &Path) -> bool {
    has_extension_in(path, &["a"])
}

/// Recognizes both `libx.so` and versioned `libx.so.1.2`.
pub fn is_shared_library_file(path: &Path) -> bool {
    has_extension_in(&remove_shared_library_version(path), &["so"])
}

pub fn is_library_file(path: &Path) -> bool {
    is_static_library_file(path) || is_shared_library_file(path)
}

/// Strips trailing version components: `libx.so.1.2` -> `libx.so`.
pub fn remove_shared_library_version(path: &Path) -> PathBuf {
    let mut current = path.to_path_buf();
    while let Some(ext) = current.extension() {
        if ext.to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
            current = remove_extension(&current);
        } else {
            break;
        }
    }
    current
}

/// Shared-library spelling of an artifact: `libroot.a` -> `libroot.so`,
/// `app` -> `libapp.so`; already-shared outputs only lose their version.
pub fn shared_library_name(path: &Path) -> PathBuf {
    let unversioned = remove_shared_library_version(path);
    if is_shared_library_file(&unversioned) {
        return unversioned;
    }
    let stem = unversioned
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let name = if stem.starts_with("lib") {
        stem
    } else {
        format!("lib{stem}")
    };
    unversioned.with_file_name(format!("{name}.so"))
}

pub fn is_subpath_of(base: &Path, path: &Path) -> bool {
    path.strip_prefix(base).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ProjectContext {
        ProjectContext {
            project_path: PathBuf::from("/proj"),
            build_dir: PathBuf::from("/proj"),
            test_dir: PathBuf::from("/proj/tests"),
            recompiled_root: PathBuf::from("/proj/build"),
            runner_dir: PathBuf::from("/utbot/gtest/googletest"),
            access_private_dir: PathBuf::from("/utbot/access_private/include"),
        }
    }

    #[test]
    fn recompiled_source_gains_object_extension() {
        let ctx = context();
        assert_eq!(
            ctx.recompiled_of(Path::new("/proj/sub/a.c")),
            PathBuf::from("/proj/build/sub/a.c.o")
        );
        assert_eq!(
            ctx.recompiled_of(Path::new("/proj/sub/a.o")),
            PathBuf::from("/proj/build/sub/a.o")
        );
    }

    #[test]
    fn stub_path_round_trip() {
        let ctx = context();
        let stub = ctx.source_to_stub_path(Path::new("/proj/lib/a.c"));
        assert_eq!(stub, PathBuf::from("/proj/tests/stubs/lib/a_stub.c"));
        assert_eq!(ctx.stub_to_source_path(&stub), PathBuf::from("/proj/lib/a.c"));
    }

    #[test]
    fn test_executable_drops_both_extensions() {
        let ctx = context();
        assert_eq!(
            ctx.test_executable_path(Path::new("/proj/a.c")),
            PathBuf::from("/proj/build/tests/a_test")
        );
    }

    #[test]
    fn shared_library_naming() {
        assert_eq!(
            shared_library_name(Path::new("/b/libroot.a")),
            PathBuf::from("/b/libroot.so")
        );
        assert_eq!(
            shared_library_name(Path::new("/b/app")),
            PathBuf::from("/b/libapp.so")
        );
        assert_eq!(
            shared_library_name(Path::new("/b/libx.so.1.2")),
            PathBuf::from("/b/libx.so")
        );
    }

    #[test]
    fn versioned_shared_library_detected() {
        assert!(is_shared_library_file(Path::new("libx.so")));
        assert!(is_shared_library_file(Path::new("libx.so.1.2.3")));
        assert!(!is_shared_library_file(Path::new("libx.a")));
    }
}
