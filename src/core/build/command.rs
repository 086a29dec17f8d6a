//! Mutable compile/link command value objects.
//!
//! A command is an argument vector plus a working directory, environment
//! pairs, and tracked source/output positions. The first argv element is
//! always the current compiler (or linker). Emitter code clones the
//! database's command and mutates the clone; stored commands are never
//! touched in place.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::build::flags::{self, FlagKind};
use crate::core::project;

/// What a recorded command does, as far as the plan emitter cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Compile,
    Archive,
    SharedLink,
    ExecutableLink,
}

#[derive(Debug, Clone)]
pub struct BuildCommand {
    argv: Vec<String>,
    directory: PathBuf,
    environment: Vec<(String, String)>,
    category: CommandCategory,
    source_index: Option<usize>,
    output_index: Option<usize>,
}

impl BuildCommand {
    /// Builds a command over a non-empty argv, detecting the source and
    /// output positions from the argument spelling.
    pub fn new(argv: Vec<String>, directory: PathBuf, category: CommandCategory) -> Self {
        debug_assert!(!argv.is_empty(), "command argv must not be empty");
        let source_index = argv
            .iter()
            .enumerate()
            .skip(1)
            .find(|(i, arg)| {
                project::is_source_file(Path::new(arg.as_str()))
                    && !preceded_by_output_flag(&argv, *i)
            })
            .map(|(i, _)| i);
        let output_index = detect_output_index(&argv, category);
        Self {
            argv,
            directory,
            environment: Vec::new(),
            category,
            source_index,
            output_index,
        }
    }

    pub fn category(&self) -> CommandCategory {
        self.category
    }

    pub fn is_archive_command(&self) -> bool {
        self.category == CommandCategory::Archive
    }

    pub fn is_shared_library_command(&self) -> bool {
        self.category == CommandCategory::SharedLink
    }

    pub fn compiler(&self) -> &str {
        &self.argv[0]
    }

    /// Same slot as [`Self::compiler`]; link commands read better this way.
    pub fn linker(&self) -> &str {
        &self.argv[0]
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn source(&self) -> Option<&str> {
        self.source_index.map(|i| self.argv[i].as_str())
    }

    pub fn output(&self) -> Option<&str> {
        self.output_index.map(|i| self.argv[i].as_str())
    }

    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.argv.iter().map(String::as_str)
    }

    /// In-place access to every argument, the compiler slot included, for
    /// cross-cutting rewrites (relativization, `-Wl,…` normalization).
    pub fn args_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.argv.iter_mut()
    }

    pub fn set_compiler(&mut self, compiler: impl Into<String>) {
        self.argv[0] = compiler.into();
    }

    pub fn set_linker(&mut self, linker: impl Into<String>) {
        self.argv[0] = linker.into();
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        match self.source_index {
            Some(i) => self.argv[i] = source.into(),
            None => {
                self.argv.push(source.into());
                self.source_index = Some(self.argv.len() - 1);
            }
        }
    }

    pub fn set_output(&mut self, output: impl Into<String>) {
        match self.output_index {
            Some(i) => self.argv[i] = output.into(),
            None => {
                self.argv.push("-o".to_string());
                self.argv.push(output.into());
                self.output_index = Some(self.argv.len() - 1);
            }
        }
    }

    /// Replaces every optimization flag with `level`, inserting it when the
    /// command carried none.
    pub fn set_optimization_level(&mut self, level: &str) {
        self.erase_if(|arg| flags::classify(arg) == FlagKind::Optimization);
        self.add_flag_to_begin(level);
    }

    /// Inserts one flag right after the compiler slot.
    pub fn add_flag_to_begin(&mut self, flag: impl Into<String>) {
        self.insert_at_begin(vec![flag.into()]);
    }

    /// Inserts a batch right after the compiler slot, keeping batch order.
    pub fn add_flags_to_begin<I, S>(&mut self, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_at_begin(flags.into_iter().map(Into::into).collect());
    }

    pub fn add_flag_to_end(&mut self, flag: impl Into<String>) {
        self.argv.push(flag.into());
    }

    pub fn erase(&mut self, flag: &str) {
        self.erase_if(|arg| arg == flag);
    }

    /// Drops every argument (compiler slot excepted) matching `predicate`,
    /// keeping the tracked source/output positions in step.
    pub fn erase_if<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&str) -> bool,
    {
        let old_source = self.source_index;
        let old_output = self.output_index;
        let mut kept = Vec::with_capacity(self.argv.len());
        let mut source_index = None;
        let mut output_index = None;
        for (i, arg) in self.argv.drain(..).enumerate() {
            if i != 0 && predicate(&arg) {
                continue;
            }
            if old_source == Some(i) {
                source_index = Some(kept.len());
            }
            if old_output == Some(i) {
                output_index = Some(kept.len());
            }
            kept.push(arg);
        }
        self.argv = kept;
        self.source_index = source_index;
        self.output_index = output_index;
    }

    pub fn add_environment_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environment.push((key.into(), value.into()));
    }

    /// Renders as `cd <dir> && ENV=… argv…`. The directory is passed in
    /// already relativized by the caller.
    pub fn to_string_with_changing_directory(&self, directory: &str) -> String {
        format!("cd {directory} && {self}")
    }

    fn insert_at_begin(&mut self, flags: Vec<String>) {
        let shift = flags.len();
        self.argv.splice(1..1, flags);
        if let Some(i) = self.source_index {
            self.source_index = Some(i + shift);
        }
        if let Some(i) = self.output_index {
            self.output_index = Some(i + shift);
        }
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.environment {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        for arg in self.argv.iter().filter(|arg| !arg.is_empty()) {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{arg}")?;
            first = false;
        }
        Ok(())
    }
}

fn preceded_by_output_flag(argv: &[String], index: usize) -> bool {
    index > 0 && argv[index - 1] == "-o"
}

fn detect_output_index(argv: &[String], category: CommandCategory) -> Option<usize> {
    if category == CommandCategory::Archive {
        return argv
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, arg)| project::is_static_library_file(Path::new(arg.as_str())))
            .map(|(i, _)| i);
    }
    argv.iter()
        .position(|arg| arg == "-o")
        .and_then(|i| (i + 1 < argv.len()).then_some(i + 1))
}
