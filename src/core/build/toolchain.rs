//! Fixed toolchain substitution tables: C compiler to C++ compiler and
//! linker, bundled binaries, and the per-compiler pthread, coverage and
//! sanitizer flag sets.

use std::path::{Path, PathBuf};

use crate::core::diag::PlanError;

pub const ASAN_OPTIONS_NAME: &str = "ASAN_OPTIONS";
pub const ASAN_OPTIONS_VALUE: &str = "halt_on_error=0:detect_leaks=0";
pub const UBSAN_OPTIONS_NAME: &str = "UBSAN_OPTIONS";
pub const UBSAN_OPTIONS_VALUE: &str = "print_stacktrace=1:halt_on_error=0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerName {
    Gcc,
    Gxx,
    Clang,
    Clangxx,
}

impl CompilerName {
    /// Detects the compiler family from a binary path. Unrecognized names
    /// cannot be mapped to the bundled toolchain and are fatal.
    pub fn from_path(compiler: &Path) -> Result<Self, PlanError> {
        let name = compiler
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.contains("clang++") {
            Ok(Self::Clangxx)
        } else if name.contains("clang") {
            Ok(Self::Clang)
        } else if name.contains("g++") {
            Ok(Self::Gxx)
        } else if name.contains("gcc") {
            Ok(Self::Gcc)
        } else {
            Err(PlanError::ToolchainUnresolved(compiler.to_path_buf()))
        }
    }

    pub fn is_gcc_family(self) -> bool {
        matches!(self, Self::Gcc | Self::Gxx)
    }

    pub fn cxx(self) -> Self {
        match self {
            Self::Gcc | Self::Gxx => Self::Gxx,
            Self::Clang | Self::Clangxx => Self::Clangxx,
        }
    }

    /// Bundled binary for this family, resolved on the generated plan's
    /// `PATH`.
    pub fn bundled_path(self) -> PathBuf {
        PathBuf::from(match self {
            Self::Gcc => "gcc",
            Self::Gxx => "g++",
            Self::Clang => "clang",
            Self::Clangxx => "clang++",
        })
    }
}

/// `gcc -> g++`, `clang -> clang++`, preserving directory and affixes
/// (`/opt/bin/gcc-9` -> `/opt/bin/g++-9`).
pub fn to_cpp_compiler(compiler: &Path) -> Result<PathBuf, PlanError> {
    let name = compiler
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let cpp_name = if name.contains("clang++") || name.contains("g++") {
        name
    } else if name.contains("clang") {
        name.replace("clang", "clang++")
    } else if name.contains("gcc") {
        name.replace("gcc", "g++")
    } else {
        return Err(PlanError::ToolchainUnresolved(compiler.to_path_buf()));
    };
    Ok(compiler.with_file_name(cpp_name))
}

/// The system linker, used directly for relocatable outputs.
pub fn ld() -> PathBuf {
    PathBuf::from("ld")
}

pub fn pthread_flag(name: CompilerName) -> &'static str {
    if name.is_gcc_family() { "-lpthread" } else { "-pthread" }
}

pub fn coverage_compile_flags(name: CompilerName) -> Vec<String> {
    if name.is_gcc_family() {
        vec!["--coverage".to_string()]
    } else {
        vec![
            "-fprofile-instr-generate".to_string(),
            "-fcoverage-mapping".to_string(),
        ]
    }
}

pub fn coverage_link_flags(name: CompilerName) -> Vec<String> {
    if name.is_gcc_family() {
        vec!["--coverage".to_string()]
    } else {
        vec!["-fprofile-instr-generate".to_string()]
    }
}

pub fn sanitizer_compile_flags(name: CompilerName) -> Vec<String> {
    if name.is_gcc_family() {
        vec!["-fsanitize=address,undefined".to_string()]
    } else {
        vec![
            "-fsanitize=address,undefined".to_string(),
            "-fno-sanitize-recover=all".to_string(),
        ]
    }
}

/// Both families link with the same checks today; name-keyed like the
/// other tables so one can diverge without touching call sites.
pub fn sanitizer_link_flags(_name: CompilerName) -> Vec<String> {
    vec!["-fsanitize=address,undefined".to_string()]
}

/// ASan runtime preloaded at `run` time; only the GCC toolchain needs it.
pub fn asan_library(name: CompilerName) -> Option<PathBuf> {
    name.is_gcc_family().then(|| PathBuf::from("libasan.so"))
}

/// The derived toolchain the emitter works with: primary C compiler plus
/// its C++ sibling, the linker, and the joined link-time flag strings.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub primary_compiler: PathBuf,
    pub primary_compiler_name: CompilerName,
    pub primary_cxx_compiler: PathBuf,
    pub primary_cxx_compiler_name: CompilerName,
    pub cxx_linker: PathBuf,
    pub pthread_flag: &'static str,
    pub coverage_link_flags: String,
    pub sanitizer_link_flags: String,
}

impl Toolchain {
    pub fn derive(primary_compiler: &Path) -> Result<Self, PlanError> {
        let primary_compiler_name = CompilerName::from_path(primary_compiler)?;
        let primary_cxx_compiler = to_cpp_compiler(primary_compiler)?;
        let primary_cxx_compiler_name = primary_compiler_name.cxx();
        Ok(Self {
            primary_compiler: primary_compiler.to_path_buf(),
            primary_compiler_name,
            cxx_linker: primary_cxx_compiler.clone(),
            primary_cxx_compiler,
            primary_cxx_compiler_name,
            pthread_flag: pthread_flag(primary_cxx_compiler_name),
            coverage_link_flags: coverage_link_flags(primary_cxx_compiler_name).join(" "),
            sanitizer_link_flags: sanitizer_link_flags(primary_cxx_compiler_name).join(" "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiler_name_mapping() {
        assert_eq!(
            CompilerName::from_path(Path::new("/usr/bin/gcc")).unwrap(),
            CompilerName::Gcc
        );
        assert_eq!(
            CompilerName::from_path(Path::new("clang++")).unwrap(),
            CompilerName::Clangxx
        );
        assert!(CompilerName::from_path(Path::new("icc")).is_err());
    }

    #[test]
    fn cpp_sibling_preserves_affixes() {
        assert_eq!(
            to_cpp_compiler(Path::new("/opt/bin/gcc-9")).unwrap(),
            PathBuf::from("/opt/bin/g++-9")
        );
        assert_eq!(
            to_cpp_compiler(Path::new("clang")).unwrap(),
            PathBuf::from("clang++")
        );
    }

    #[test]
    fn derive_builds_the_cxx_side() {
        let toolchain = Toolchain::derive(Path::new("/usr/bin/gcc")).unwrap();
        assert_eq!(toolchain.primary_cxx_compiler, PathBuf::from("/usr/bin/g++"));
        assert_eq!(toolchain.cxx_linker, PathBuf::from("/usr/bin/g++"));
        assert_eq!(toolchain.pthread_flag, "-lpthread");
    }
}
