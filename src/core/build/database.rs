//! Read-only projection over the user's recorded compile and link
//! commands.
//!
//! The database is immutable after construction. Compile units are keyed
//! by both their source path and their object output; link units by their
//! output. Records arrive either as `compile_commands.json` /
//! `link_commands.json` files next to the user's build tree or, in tests,
//! as in-memory command objects.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::core::build::command::{BuildCommand, CommandCategory};
use crate::core::diag::{DatabaseError, PlanError};
use crate::core::project;

/// Kind of a link-DAG node, derivable from its output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Object,
    StaticLibrary,
    SharedLibrary,
    Executable,
}

impl LinkKind {
    pub fn from_output(path: &Path) -> Self {
        if project::is_object_file(path) {
            Self::Object
        } else if project::is_static_library_file(path) {
            Self::StaticLibrary
        } else if project::is_shared_library_file(path) {
            Self::SharedLibrary
        } else {
            Self::Executable
        }
    }

    fn agrees_with(self, category: CommandCategory) -> bool {
        matches!(
            (self, category),
            (Self::StaticLibrary, CommandCategory::Archive)
                | (Self::SharedLibrary, CommandCategory::SharedLink)
                | (Self::Executable, CommandCategory::ExecutableLink)
        )
    }
}

/// A translation unit's recorded compilation.
#[derive(Debug, Clone)]
pub struct CompilationUnitInfo {
    pub command: BuildCommand,
    pub source: PathBuf,
    pub output: PathBuf,
}

impl CompilationUnitInfo {
    /// Derives source and output from the command's tracked positions,
    /// resolving them against the command's working directory.
    pub fn from_command(command: BuildCommand) -> Result<Self, DatabaseError> {
        let directory = command.directory().to_path_buf();
        let source = command
            .source()
            .map(|s| absolutize(&directory, Path::new(s)))
            .ok_or_else(|| DatabaseError::EmptyCommand(directory.clone()))?;
        let output = command
            .output()
            .map(|o| absolutize(&directory, Path::new(o)))
            .ok_or_else(|| DatabaseError::MissingOutput(source.clone()))?;
        Ok(Self {
            command,
            source,
            output,
        })
    }
}

/// A node of the link DAG: output, inputs, and the command(s) producing
/// it. Some archivers record more than one command per output.
#[derive(Debug, Clone)]
pub struct LinkUnitInfo {
    pub output: PathBuf,
    pub files: Vec<PathBuf>,
    pub commands: Vec<BuildCommand>,
    pub kind: LinkKind,
}

#[derive(Debug)]
pub struct BuildDatabase {
    compile_units: Vec<CompilationUnitInfo>,
    link_units: Vec<LinkUnitInfo>,
    compile_by_source: IndexMap<PathBuf, usize>,
    compile_by_output: IndexMap<PathBuf, usize>,
    link_by_output: IndexMap<PathBuf, usize>,
}

impl BuildDatabase {
    pub fn new(
        compile_units: Vec<CompilationUnitInfo>,
        link_units: Vec<LinkUnitInfo>,
    ) -> Result<Self, DatabaseError> {
        for unit in &link_units {
            for command in &unit.commands {
                if !unit.kind.agrees_with(command.category()) {
                    return Err(DatabaseError::KindMismatch {
                        unit: unit.output.clone(),
                        category: command.category(),
                        kind: unit.kind,
                    });
                }
            }
        }
        let mut compile_by_source = IndexMap::new();
        let mut compile_by_output = IndexMap::new();
        for (index, unit) in compile_units.iter().enumerate() {
            compile_by_source.insert(unit.source.clone(), index);
            compile_by_output.insert(unit.output.clone(), index);
        }
        let mut link_by_output = IndexMap::new();
        for (index, unit) in link_units.iter().enumerate() {
            link_by_output.insert(unit.output.clone(), index);
        }
        Ok(Self {
            compile_units,
            link_units,
            compile_by_source,
            compile_by_output,
            link_by_output,
        })
    }

    /// Loads `compile_commands.json` and `link_commands.json` from the
    /// user's build directory.
    pub fn load(build_dir: &Path) -> Result<Self, DatabaseError> {
        let compile_records: Vec<CompileRecord> =
            read_json(&build_dir.join("compile_commands.json"))?;
        let link_records: Vec<LinkRecord> = read_json(&build_dir.join("link_commands.json"))?;

        let mut compile_units = Vec::with_capacity(compile_records.len());
        for record in compile_records {
            compile_units.push(record.into_unit()?);
        }
        let mut link_units = Vec::with_capacity(link_records.len());
        for record in link_records {
            link_units.push(record.into_unit()?);
        }
        Self::new(compile_units, link_units)
    }

    pub fn compilation_unit(&self, path: &Path) -> Result<&CompilationUnitInfo, PlanError> {
        self.compile_by_source
            .get(path)
            .or_else(|| self.compile_by_output.get(path))
            .map(|&index| &self.compile_units[index])
            .ok_or_else(|| PlanError::UnknownUnit(path.to_path_buf()))
    }

    pub fn link_unit(&self, path: &Path) -> Result<&LinkUnitInfo, PlanError> {
        self.link_by_output
            .get(path)
            .map(|&index| &self.link_units[index])
            .ok_or_else(|| PlanError::UnknownUnit(path.to_path_buf()))
    }

    pub fn compile_units(&self) -> impl Iterator<Item = &CompilationUnitInfo> {
        self.compile_units.iter()
    }

    pub fn link_units(&self) -> impl Iterator<Item = &LinkUnitInfo> {
        self.link_units.iter()
    }
}

fn absolutize(directory: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, DatabaseError> {
    let text = std::fs::read_to_string(path).map_err(|source| DatabaseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| DatabaseError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// `compile_commands.json` entry; accepts both the `arguments` array and
/// the single `command` string spelling.
#[derive(Debug, Deserialize)]
struct CompileRecord {
    directory: String,
    file: String,
    #[serde(default)]
    arguments: Vec<String>,
    #[serde(default)]
    command: Option<String>,
}

impl CompileRecord {
    fn into_unit(self) -> Result<CompilationUnitInfo, DatabaseError> {
        let directory = PathBuf::from(&self.directory);
        let argv = if !self.arguments.is_empty() {
            self.arguments
        } else {
            shell_split(self.command.as_deref().unwrap_or_default())
        };
        if argv.is_empty() {
            return Err(DatabaseError::EmptyCommand(PathBuf::from(self.file)));
        }
        let command = BuildCommand::new(argv, directory, CommandCategory::Compile);
        CompilationUnitInfo::from_command(command)
    }
}

/// `link_commands.json` entry: output, input files, and one or more
/// command argv arrays.
#[derive(Debug, Deserialize)]
struct LinkRecord {
    directory: String,
    output: String,
    #[serde(default)]
    files: Vec<String>,
    commands: Vec<Vec<String>>,
}

impl LinkRecord {
    fn into_unit(self) -> Result<LinkUnitInfo, DatabaseError> {
        let directory = PathBuf::from(&self.directory);
        let output = absolutize(&directory, Path::new(&self.output));
        let kind = LinkKind::from_output(&output);
        let files: Vec<PathBuf> = self
            .files
            .iter()
            .map(|file| absolutize(&directory, Path::new(file)))
            .collect();
        let mut commands = Vec::with_capacity(self.commands.len());
        for mut argv in self.commands {
            if argv.is_empty() {
                return Err(DatabaseError::EmptyCommand(output.clone()));
            }
            // Inputs and outputs must match their absolute spellings so the
            // emitter's argument mapping finds them.
            for arg in argv.iter_mut().skip(1) {
                let resolved = absolutize(&directory, Path::new(arg.as_str()));
                if resolved == output || files.contains(&resolved) {
                    *arg = resolved.to_string_lossy().to_string();
                }
            }
            let category = infer_link_category(&argv, &output);
            commands.push(BuildCommand::new(argv, directory.clone(), category));
        }
        Ok(LinkUnitInfo {
            output,
            files,
            commands,
            kind,
        })
    }
}

fn infer_link_category(argv: &[String], output: &Path) -> CommandCategory {
    let tool = Path::new(&argv[0])
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    if tool == "ar" || tool.ends_with("-ar") || tool == "libtool" {
        CommandCategory::Archive
    } else if argv.iter().any(|arg| arg == "-shared")
        || project::is_shared_library_file(output)
    {
        CommandCategory::SharedLink
    } else {
        CommandCategory::ExecutableLink
    }
}

/// Minimal shell splitting for `command`-style records: whitespace
/// separated, with single/double quotes and backslash escapes honored.
fn shell_split(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = command.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '\\' if !in_single => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_unit(directory: &str, argv: &[&str]) -> CompilationUnitInfo {
        let command = BuildCommand::new(
            argv.iter().map(|s| s.to_string()).collect(),
            PathBuf::from(directory),
            CommandCategory::Compile,
        );
        CompilationUnitInfo::from_command(command).unwrap()
    }

    #[test]
    fn lookup_by_source_and_output() {
        let unit = compile_unit("/proj", &["gcc", "-c", "a.c", "-o", "a.o"]);
        let db = BuildDatabase::new(vec![unit], vec![]).unwrap();
        assert!(db.compilation_unit(Path::new("/proj/a.c")).is_ok());
        assert!(db.compilation_unit(Path::new("/proj/a.o")).is_ok());
        assert!(matches!(
            db.compilation_unit(Path::new("/proj/missing.c")),
            Err(PlanError::UnknownUnit(_))
        ));
    }

    #[test]
    fn kind_and_category_must_agree() {
        let archive = BuildCommand::new(
            vec!["ar", "cru", "libx.a", "a.o"]
                .into_iter()
                .map(String::from)
                .collect(),
            PathBuf::from("/proj"),
            CommandCategory::Archive,
        );
        let unit = LinkUnitInfo {
            output: PathBuf::from("/proj/libx.so"),
            files: vec![PathBuf::from("/proj/a.o")],
            commands: vec![archive],
            kind: LinkKind::from_output(Path::new("/proj/libx.so")),
        };
        assert!(matches!(
            BuildDatabase::new(vec![], vec![unit]),
            Err(DatabaseError::KindMismatch { .. })
        ));
    }

    #[test]
    fn shell_split_honors_quotes() {
        assert_eq!(
            shell_split(r#"gcc -DNAME="a b" 'c d' e\ f"#),
            vec!["gcc", "-DNAME=a b", "c d", "e f"]
        );
    }

    #[test]
    fn loads_json_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("compile_commands.json"),
            r#"[{"directory": "/proj", "file": "a.c", "command": "gcc -c a.c -o a.o"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("link_commands.json"),
            r#"[{"directory": "/proj", "output": "app",
                 "files": ["a.o"],
                 "commands": [["gcc", "a.o", "-o", "app"]]}]"#,
        )
        .unwrap();
        let db = BuildDatabase::load(dir.path()).unwrap();
        let unit = db.compilation_unit(Path::new("/proj/a.c")).unwrap();
        assert_eq!(unit.output, PathBuf::from("/proj/a.o"));
        let link = db.link_unit(Path::new("/proj/app")).unwrap();
        assert_eq!(link.kind, LinkKind::Executable);
        assert_eq!(link.files, vec![PathBuf::from("/proj/a.o")]);
    }
}
