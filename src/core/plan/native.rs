//! Native plan emitter.
//!
//! Walks the link DAG of a chosen root artifact and emits the build plan
//! that recompiles every reachable translation unit with instrumentation
//! and links the result, together with the runner library, into a test
//! executable. Traversal is a memoized post-order; the recompiled image of
//! the deepest shared library or executable processed last becomes the
//! link target of the test binary.

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::core::build::command::{BuildCommand, CommandCategory};
use crate::core::build::database::{BuildDatabase, CompilationUnitInfo, LinkUnitInfo};
use crate::core::build::flags::{self, FlagKind};
use crate::core::build::toolchain::{self, CompilerName, Toolchain};
use crate::core::diag::PlanError;
use crate::core::plan::relative::PathSubstitution;
use crate::core::plan::{FORCE, Plan};
use crate::core::project::{self, ProjectContext};

const STUB_OBJECT_FILES_NAME: &str = "STUB_OBJECT_FILES";
const STUB_OBJECT_FILES: &str = "$(STUB_OBJECT_FILES)";

const FPIC_FLAG: &str = "-fPIC";
const STATIC_FLAG: &str = "-static";
const SHARED_FLAG: &str = "-shared";
const RELOCATE_FLAG: &str = "-r";
const OPTIMIZATION_FLAG: &str = "-O0";
const SANITIZER_NEEDED_FLAGS: [&str; 3] = ["-g", "-fno-omit-frame-pointer", "-fno-optimize-sibling-calls"];

/// Stub taint of a build result. Forms a monoid under union with `None`
/// as identity; a unit mixing stubbed and unstubbed inputs is `Mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StubProvenance {
    #[default]
    None,
    NoStubs,
    AllStubs,
    Mixed,
}

impl StubProvenance {
    pub fn union(self, other: Self) -> Self {
        use StubProvenance::*;
        match (self, other) {
            (None, x) | (x, None) => x,
            (Mixed, _) | (_, Mixed) => Mixed,
            (NoStubs, NoStubs) => NoStubs,
            (AllStubs, AllStubs) => AllStubs,
            (NoStubs, AllStubs) | (AllStubs, NoStubs) => Mixed,
        }
    }

    /// Suffix appended to a recompiled link output: stub-only units are
    /// marked `_stub`, mixed units carry the caller-chosen suffix.
    fn suffix<'a>(self, parent_of_stubs: &'a str) -> &'a str {
        match self {
            Self::AllStubs => "_stub",
            Self::Mixed => parent_of_stubs,
            Self::None | Self::NoStubs => "",
        }
    }
}

impl std::ops::BitOr for StubProvenance {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for StubProvenance {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Per-node result of the link traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Recompiled artifact path.
    pub output: PathBuf,
    pub provenance: StubProvenance,
}

#[derive(Clone)]
pub struct NativePlanEmitter<'db> {
    project: ProjectContext,
    database: &'db BuildDatabase,
    root: PathBuf,
    toolchain: Toolchain,
    stub_sources: IndexSet<PathBuf>,
    subst: PathSubstitution,
    build_dir: PathBuf,
    dependency_dir: PathBuf,
    plan: Plan,
    artifacts: Vec<String>,
    build_results: IndexMap<PathBuf, BuildResult>,
    shared_output: Option<PathBuf>,
}

impl<'db> NativePlanEmitter<'db> {
    /// Sets up the emitter and the plan preamble: build/dependency
    /// directories, the `FORCE` sentinel and the runner-library pair.
    pub fn new(
        project: ProjectContext,
        database: &'db BuildDatabase,
        root: PathBuf,
        primary_compiler: &Path,
        stub_sources: IndexSet<PathBuf>,
        substitutions: Vec<(PathBuf, String)>,
    ) -> Result<Self, PlanError> {
        let toolchain = Toolchain::derive(primary_compiler)?;
        let build_dir = project.recompiled_root.clone();
        let dependency_dir = build_dir.join("dependencies");
        let subst = PathSubstitution::new(project.project_path.clone(), substitutions);
        let mut emitter = Self {
            project,
            database,
            root,
            toolchain,
            stub_sources,
            subst,
            build_dir: build_dir.clone(),
            dependency_dir: dependency_dir.clone(),
            plan: Plan::new(),
            artifacts: Vec::new(),
            build_results: IndexMap::new(),
            shared_output: None,
        };
        emitter.artifacts = vec![emitter.rel(&build_dir), emitter.rel(&dependency_dir)];
        emitter.init();
        Ok(emitter)
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn render(&self) -> String {
        self.plan.render()
    }

    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }

    pub fn build_results(&self) -> &IndexMap<PathBuf, BuildResult> {
        &self.build_results
    }

    /// Latest recompiled shared library or executable the traversal saw.
    pub fn shared_output(&self) -> Option<&Path> {
        self.shared_output.as_deref()
    }

    fn rel(&self, path: &Path) -> String {
        self.subst.relativize(path)
    }

    fn init(&mut self) {
        let build = self.rel(&self.build_dir);
        let deps = self.rel(&self.dependency_dir);
        self.plan.raw(format!("$(shell mkdir -p {build} >/dev/null)"));
        self.plan.raw(format!("$(shell mkdir -p {deps} >/dev/null)"));
        self.plan.declare_target(FORCE, vec![], vec![]);

        self.plan.comment("gtest");
        let gtest_build_dir = self.build_dir.join("googletest");
        self.runner_object_target(&gtest_build_dir, "gtest-all.cc", "GTEST_ALL");
        self.runner_object_target(&gtest_build_dir, "gtest_main.cc", "GTEST_MAIN");
        self.plan.comment("/gtest");
    }

    /// Compiles one runner-library source (`gtest-all.cc` / `gtest_main.cc`)
    /// and binds the object to its shell variable.
    fn runner_object_target(&mut self, gtest_build_dir: &Path, source_name: &str, variable: &str) {
        let source = self.project.runner_dir.join("src").join(source_name);
        let object = gtest_build_dir.join(format!("{source_name}.o"));
        let source_rel = self.rel(&source);
        let object_rel = self.rel(&object);

        let mut command = BuildCommand::new(
            vec![
                self.rel(&self.toolchain.primary_cxx_compiler),
                "-c".to_string(),
                "-std=c++11".to_string(),
                FPIC_FLAG.to_string(),
                "default.c".to_string(),
            ],
            self.build_dir.clone(),
            CommandCategory::Compile,
        );
        command.add_flags_to_begin([
            format!("-I{}", self.rel(&self.project.runner_dir.join("include"))),
            format!("-I{}", self.rel(&self.project.runner_dir)),
        ]);
        command.set_source(source_rel.clone());
        command.set_output(object_rel.clone());

        let action = command.to_string_with_changing_directory(&self.rel(&self.build_dir));
        self.plan
            .declare_target(object_rel.clone(), vec![source_rel], vec![action]);
        self.plan.declare_variable(variable, object_rel.clone());
        self.artifacts.push(object_rel);
    }

    /// Emits the compile rule for one translation unit: bundled compiler,
    /// relativized arguments, forced `-O0`, instrumentation flags, and
    /// crash-safe dependency tracking (`.Td` renamed to `.d` only after a
    /// successful compile).
    fn add_compile_target(
        &mut self,
        source: &Path,
        target: &Path,
        info: &CompilationUnitInfo,
    ) -> Result<(), PlanError> {
        let mut command = info.command.clone();
        let compiler_name = CompilerName::from_path(Path::new(command.compiler()))?;
        command.set_compiler(self.rel(&compiler_name.bundled_path()));
        command.set_source(self.rel(source));
        command.set_output(self.rel(target));
        for argument in command.args_mut() {
            self.subst.rewrite_argument(argument);
        }

        command.set_optimization_level(OPTIMIZATION_FLAG);
        command.add_environment_variable("C_INCLUDE_PATH", "$UTBOT_LAUNCH_INCLUDE_PATH");
        command.add_flag_to_begin(FPIC_FLAG);
        command.add_flags_to_begin(SANITIZER_NEEDED_FLAGS);
        command.add_flags_to_begin(toolchain::coverage_compile_flags(
            self.toolchain.primary_compiler_name,
        ));
        command.add_flags_to_begin(toolchain::sanitizer_compile_flags(compiler_name));

        // Dependency files are keyed by the unit's original source, not by
        // whatever file actually gets compiled (stub or wrapper).
        let rel_source = self.project.rel_under(&info.source);
        let temp_dep_path = self.dependency_dir.join(project::add_extension(&rel_source, ".Td"));
        let dep_path = self.dependency_dir.join(project::add_extension(&rel_source, ".d"));
        let temp_dep = self.rel(&temp_dep_path);
        let dep = self.rel(&dep_path);
        command.add_flag_to_begin(format!("-MT $@ -MMD -MP -MF {temp_dep}"));

        let source_dir = info.source.parent().unwrap_or(Path::new("/"));
        command.add_flag_to_begin(format!("-iquote{}", self.rel(source_dir)));

        let dep_parent = temp_dep_path.parent().unwrap_or(&self.dependency_dir);
        let actions = vec![
            format!("mkdir -p {}", self.rel(dep_parent)),
            command.to_string_with_changing_directory(&self.rel(info.command.directory())),
            format!("mv -f {temp_dep} {dep}"),
        ];

        let target_rel = self.rel(target);
        debug!(target = %target_rel, "compile rule");
        self.plan
            .declare_target(target_rel.clone(), vec![self.rel(source), dep], actions);
        self.artifacts.push(target_rel);
        Ok(())
    }

    /// Recompiles one object file. Units in the stub set compile from
    /// their stub source; non-C++ units compile from their wrapper.
    fn add_object_file(&mut self, object: &Path) -> Result<BuildResult, PlanError> {
        let database = self.database;
        let info = database.compilation_unit(object)?;

        let (path_to_compile, recompiled, provenance) = if self.stub_sources.contains(&info.source)
        {
            let stub = self.project.source_to_stub_path(&info.source);
            let recompiled = self.project.recompiled_of(&stub);
            (stub, recompiled, StubProvenance::AllStubs)
        } else {
            let path = if project::is_cxx_file(&info.source) {
                info.source.clone()
            } else {
                self.project.wrapper_path(&info.source)
            };
            (
                path,
                self.project.recompiled_of(&info.output),
                StubProvenance::NoStubs,
            )
        };

        self.add_compile_target(&path_to_compile, &recompiled, info)?;
        Ok(BuildResult {
            output: recompiled,
            provenance,
        })
    }

    /// Emits link rules for `unit` and everything below it.
    pub fn emit_link_targets(
        &mut self,
        unit: &Path,
        suffix_for_parent_of_stubs: &str,
        transform_exe_to_lib: bool,
    ) -> Result<BuildResult, PlanError> {
        self.add_link_target(unit, suffix_for_parent_of_stubs, false, transform_exe_to_lib)
    }

    fn add_link_target(
        &mut self,
        unit: &Path,
        suffix_for_parent_of_stubs: &str,
        has_parent: bool,
        transform_exe_to_lib: bool,
    ) -> Result<BuildResult, PlanError> {
        if let Some(result) = self.build_results.get(unit) {
            return Ok(result.clone());
        }
        if project::is_object_file(unit) {
            let result = self.add_object_file(unit)?;
            self.build_results.insert(unit.to_path_buf(), result.clone());
            return Ok(result);
        }

        let database = self.database;
        let link_info = database.link_unit(unit)?;
        debug!(unit = %unit.display(), "link rules");

        let mut provenance = StubProvenance::None;
        let mut file_mapping: IndexMap<PathBuf, PathBuf> = IndexMap::new();
        for input in &link_info.files {
            let result = self.add_link_target(
                input,
                suffix_for_parent_of_stubs,
                true,
                transform_exe_to_lib,
            )?;
            provenance |= result.provenance;
            file_mapping.insert(input.clone(), result.output);
        }
        let mut dependencies: Vec<String> =
            file_mapping.values().map(|output| self.rel(output)).collect();

        let is_executable = !project::is_library_file(unit);
        let mut recompiled = self.project.recompiled_of(&link_info.output);
        if is_executable && !transform_exe_to_lib {
            // Left as an executable it relinks relocatable, so the harness
            // can wrap it; the output must look like an object.
            if !project::is_object_file(&recompiled) {
                recompiled = project::add_extension(&recompiled, ".o");
            }
        } else if project::is_shared_library_file(unit) || is_executable {
            recompiled = project::shared_library_name(&recompiled);
        }
        let suffix = provenance.suffix(suffix_for_parent_of_stubs);
        if !suffix.is_empty() {
            recompiled = project::add_suffix(&recompiled, suffix);
        }

        if is_executable || project::is_shared_library_file(unit) {
            self.shared_output = Some(recompiled.clone());
        }

        let recompiled_rel = self.rel(&recompiled);
        let mut actions = vec![format!("rm -f {recompiled_rel}")];
        for original in &link_info.commands {
            actions.push(self.transform_link_command(
                original,
                link_info,
                &file_mapping,
                &recompiled,
                is_executable,
                transform_exe_to_lib,
                &mut dependencies,
            )?);
        }

        self.plan
            .declare_target(recompiled_rel.clone(), dependencies, actions);
        self.artifacts.push(recompiled_rel.clone());

        if !has_parent && project::is_static_library_file(unit) {
            self.add_root_archive_shared_rule(&recompiled, &recompiled_rel);
        }

        let result = BuildResult {
            output: recompiled,
            provenance,
        };
        self.build_results.insert(unit.to_path_buf(), result.clone());
        Ok(result)
    }

    /// Rewrites one recorded link command for the instrumented build.
    #[allow(clippy::too_many_arguments)]
    fn transform_link_command(
        &self,
        original: &BuildCommand,
        link_info: &LinkUnitInfo,
        file_mapping: &IndexMap<PathBuf, PathBuf>,
        recompiled: &Path,
        is_executable: bool,
        transform_exe_to_lib: bool,
        dependencies: &mut Vec<String>,
    ) -> Result<String, PlanError> {
        let mut command = original.clone();
        command.erase(STATIC_FLAG);
        command.set_output(recompiled.to_string_lossy().to_string());
        for argument in command.args_mut() {
            let mapped = file_mapping.get(Path::new(argument.as_str())).cloned();
            if let Some(mapped) = mapped {
                *argument = mapped.to_string_lossy().to_string();
            }
        }

        if !command.is_archive_command() {
            if is_executable && !transform_exe_to_lib {
                // Relocatable output goes straight through the system
                // linker; compiler-ferried flags become bare ones.
                command.set_linker(toolchain::ld().to_string_lossy().to_string());
                for argument in command.args_mut() {
                    flags::transform_compiler_flags_to_linker_flags(argument);
                }
            } else {
                let linker_name = CompilerName::from_path(Path::new(command.linker()))?;
                command.set_linker(linker_name.bundled_path().to_string_lossy().to_string());
            }

            for argument in command.args_mut() {
                flags::remove_script_flag(argument);
                flags::remove_soname_flag(argument);
            }
            let mut library_dir_flags = Vec::new();
            for argument in command.args() {
                if let Some(library_dir) = library_absolute_path(argument, command.directory()) {
                    if project::is_subpath_of(&self.project.build_dir, &library_dir) {
                        let recompiled_dir = self.project.recompiled_of(&library_dir);
                        library_dir_flags.push(format!("-L{}", recompiled_dir.display()));
                    }
                }
            }
            command.add_flags_to_begin(library_dir_flags);

            if !is_executable || transform_exe_to_lib {
                command.add_flags_to_begin([
                    "-Wl,--allow-multiple-definition".to_string(),
                    self.toolchain.coverage_link_flags.clone(),
                    self.toolchain.sanitizer_link_flags.clone(),
                    "-Wl,--whole-archive".to_string(),
                ]);
                if command.is_shared_library_command() {
                    command.add_flag_to_end(STUB_OBJECT_FILES);
                    dependencies.push(STUB_OBJECT_FILES.to_string());
                }
                command.add_flag_to_end("-Wl,--no-whole-archive");
                command.set_optimization_level(OPTIMIZATION_FLAG);
            }
            command.add_flag_to_begin("$(LDFLAGS)");
            if is_executable {
                command.add_flag_to_begin(if transform_exe_to_lib {
                    SHARED_FLAG
                } else {
                    RELOCATE_FLAG
                });
            }
        }

        let linker_rel = self.subst.relativize(Path::new(command.linker()));
        command.set_linker(linker_rel);
        for argument in command.args_mut() {
            self.subst.rewrite_argument(argument);
        }

        let directory = self.rel(command.directory());
        let action = command.to_string_with_changing_directory(&directory);
        if is_executable && !transform_exe_to_lib {
            let output_rel = self.rel(recompiled);
            Ok(format!(
                "{action} && objcopy --redefine-sym main=main__ {output_rel}"
            ))
        } else {
            Ok(action)
        }
    }

    /// A static library chosen as the traversal root additionally gets a
    /// synthetic shared wrapper so the harness has something to dlopen.
    fn add_root_archive_shared_rule(&mut self, recompiled_archive: &Path, archive_rel: &str) {
        let shared = project::shared_library_name(recompiled_archive);
        let shared_rel = self.rel(&shared);

        let argv = vec![
            self.rel(&self.toolchain.primary_compiler),
            "$(LDFLAGS)".to_string(),
            SHARED_FLAG.to_string(),
            self.toolchain.coverage_link_flags.clone(),
            self.toolchain.sanitizer_link_flags.clone(),
            "-o".to_string(),
            shared_rel.clone(),
            "-Wl,--whole-archive".to_string(),
            archive_rel.to_string(),
            "-Wl,--allow-multiple-definition".to_string(),
            STUB_OBJECT_FILES.to_string(),
            "-Wl,--no-whole-archive".to_string(),
        ];
        let command = BuildCommand::new(argv, self.build_dir.clone(), CommandCategory::SharedLink);
        let action = command.to_string_with_changing_directory(&self.rel(&self.build_dir));

        self.plan.declare_target(
            shared_rel.clone(),
            vec![archive_rel.to_string(), STUB_OBJECT_FILES.to_string()],
            vec![action],
        );
        self.artifacts.push(shared_rel);
        self.shared_output = Some(shared);
    }

    /// Compiles every non-header stub in the set and binds the object list
    /// to the `STUB_OBJECT_FILES` variable.
    pub fn add_stubs(&mut self, stub_files: &IndexSet<PathBuf>) -> Result<(), PlanError> {
        let database = self.database;
        let mut objects = Vec::new();
        for stub in stub_files {
            if project::is_header_file(stub) {
                continue;
            }
            let source = self.project.stub_to_source_path(stub);
            let info = database.compilation_unit(&source)?;
            let target = self.project.recompiled_of(stub);
            self.add_compile_target(stub, &target, info)?;
            objects.push(self.rel(&target));
        }
        self.plan
            .declare_variable(STUB_OBJECT_FILES_NAME, objects.join(" "));
        Ok(())
    }

    /// Compiles the generated test source and links the test executable
    /// against the traversal's shared output and the runner objects.
    pub fn add_test_target(&mut self, source: &Path) -> Result<(), PlanError> {
        let database = self.database;
        let info = database.compilation_unit(source)?;

        let mut command = info.command.clone();
        command.set_compiler(self.rel(&self.toolchain.primary_cxx_compiler));
        command.set_optimization_level(OPTIMIZATION_FLAG);
        command.erase_if(|argument| flags::classify(argument) == FlagKind::Unsupported);
        command.erase_if(|argument| flags::classify(argument) == FlagKind::Include);
        command.add_flag_to_begin(format!(
            "-I{}",
            self.rel(&self.project.runner_dir.join("include"))
        ));
        if project::is_cxx_file(source) {
            command.add_flag_to_begin(format!("-I{}", self.rel(&self.project.access_private_dir)));
        }
        command.add_flag_to_begin(FPIC_FLAG);
        command.add_flags_to_begin(SANITIZER_NEEDED_FLAGS);

        let test_source = self.project.source_to_test_path(source);
        let test_object = self.project.recompiled_of(&test_source);
        let test_object_rel = self.rel(&test_object);
        let test_source_rel = self.rel(&test_source);
        command.set_source(test_source_rel.clone());
        command.set_output(test_object_rel.clone());

        let compile_action =
            command.to_string_with_changing_directory(&self.rel(info.command.directory()));
        self.plan.declare_target(
            test_object_rel.clone(),
            vec![test_source_rel],
            vec![compile_action],
        );
        self.artifacts.push(test_object_rel.clone());

        let root_info = database.link_unit(&self.root)?;
        let Some(primary_command) = root_info.commands.first() else {
            return Err(PlanError::UnsupportedUnit {
                unit: self.root.clone(),
                reason: "root link unit has no commands".to_string(),
            });
        };
        let shared_output =
            self.shared_output
                .clone()
                .ok_or_else(|| PlanError::UnsupportedUnit {
                    unit: self.root.clone(),
                    reason: "link traversal produced no shared output".to_string(),
                })?;
        let shared_output_dir = shared_output.parent().unwrap_or(Path::new("/")).to_path_buf();

        let test_executable = self.project.test_executable_path(source);
        let test_executable_rel = self.rel(&test_executable);

        let files_to_link: Vec<String> = vec![
            "$(GTEST_MAIN)".to_string(),
            "$(GTEST_ALL)".to_string(),
            test_object_rel,
            self.rel(&shared_output),
        ];

        if primary_command.is_archive_command() {
            // The archive root never contributes its own library inputs
            // here; the shared wrapper stands in for the whole archive.
            let mut argv = vec![
                self.rel(&self.toolchain.cxx_linker),
                "$(LDFLAGS)".to_string(),
                self.toolchain.pthread_flag.to_string(),
                self.toolchain.coverage_link_flags.clone(),
                self.toolchain.sanitizer_link_flags.clone(),
                "-o".to_string(),
                test_executable_rel.clone(),
            ];
            argv.extend(files_to_link.iter().cloned());
            argv.push(format!("-L{}", self.rel(&shared_output_dir)));
            let link =
                BuildCommand::new(argv, self.build_dir.clone(), CommandCategory::ExecutableLink);
            let action = link.to_string_with_changing_directory(&self.rel(&self.build_dir));
            self.plan
                .declare_target(test_executable_rel.clone(), files_to_link, vec![action]);
        } else {
            let mut link = primary_command.clone();
            link.erase_if(|argument| {
                root_info
                    .files
                    .iter()
                    .any(|file| file.as_path() == Path::new(argument))
                    || argument == SHARED_FLAG
                    || argument.starts_with("-L")
                    || argument.starts_with("-l")
            });
            for argument in link.args_mut() {
                flags::remove_script_flag(argument);
                flags::remove_soname_flag(argument);
            }
            link.set_optimization_level(OPTIMIZATION_FLAG);
            link.add_flags_to_begin([
                self.toolchain.pthread_flag.to_string(),
                self.toolchain.coverage_link_flags.clone(),
                self.toolchain.sanitizer_link_flags.clone(),
            ]);

            // Library-file inputs of the root survive, mapped through the
            // traversal's build results.
            let mut linked_files = files_to_link;
            for file in &root_info.files {
                if project::is_library_file(file) {
                    let mapped = self
                        .build_results
                        .get(file)
                        .map(|result| result.output.clone())
                        .unwrap_or_else(|| file.clone());
                    linked_files.push(self.rel(&mapped));
                }
            }
            link.add_flags_to_begin(linked_files.clone());
            link.add_flag_to_begin(format!("-L{}", self.rel(&shared_output_dir)));
            link.add_flag_to_begin("$(LDFLAGS)");
            link.set_linker(self.rel(&self.toolchain.cxx_linker));
            link.set_output(test_executable_rel.clone());
            for argument in link.args_mut() {
                self.subst.rewrite_argument(argument);
            }
            let action = link.to_string_with_changing_directory(&self.rel(link.directory()));
            self.plan
                .declare_target(test_executable_rel.clone(), linked_files, vec![action]);
        }
        self.artifacts.push(test_executable_rel);
        Ok(())
    }

    /// Clones the base emitter for one test source: appends the test
    /// compile/link rules, the `bin`/`build`/`run` convenience targets and
    /// the closing stanza, leaving the base untouched.
    pub fn fork_for_test(&self, source: &Path) -> Result<NativePlanEmitter<'db>, PlanError> {
        let mut forked = self.clone();
        forked.add_test_target(source)?;

        let test_executable = forked.project.test_executable_path(source);
        let shared_output = forked
            .shared_output
            .clone()
            .ok_or_else(|| PlanError::UnsupportedUnit {
                unit: forked.root.clone(),
                reason: "link traversal produced no shared output".to_string(),
            })?;

        let coverage_binary = if project::is_library_file(&shared_output) {
            shared_output
        } else {
            test_executable.clone()
        };
        let bin_action = format!("echo {}", forked.rel(&coverage_binary));
        forked
            .plan
            .declare_target("bin", vec![FORCE.to_string()], vec![bin_action]);

        let mut environment = vec![("PATH".to_string(), "$$PATH:$(pwd)".to_string())];
        if forked.toolchain.primary_compiler_name.is_gcc_family() {
            if let Some(asan) = toolchain::asan_library(forked.toolchain.primary_compiler_name) {
                environment.push((
                    "LD_PRELOAD".to_string(),
                    format!("{}:${{LD_PRELOAD}}", forked.rel(&asan)),
                ));
            }
        }
        environment.push((
            toolchain::UBSAN_OPTIONS_NAME.to_string(),
            toolchain::UBSAN_OPTIONS_VALUE.to_string(),
        ));
        environment.push((
            toolchain::ASAN_OPTIONS_NAME.to_string(),
            toolchain::ASAN_OPTIONS_VALUE.to_string(),
        ));
        let environment = environment
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<String>>()
            .join(" ");
        let run_action = format!(
            "cd {} && {environment} {} $(GTEST_FLAGS)",
            forked.rel(&forked.build_dir),
            forked.rel(&test_executable),
        );

        let exe_rel = forked.rel(&test_executable);
        forked.plan.declare_target("build", vec![exe_rel], vec![]);
        forked
            .plan
            .declare_target("run", vec!["build".to_string()], vec![run_action]);
        forked.close();
        Ok(forked)
    }

    /// Closing stanza: `clean`, the precious dependency pattern, and the
    /// `-include` of every dependency file.
    fn close(&mut self) {
        self.plan.declare_target(
            "clean",
            vec![],
            vec![format!("rm -rf {}", self.artifacts.join(" "))],
        );
        let deps = self.rel(&self.dependency_dir);
        self.plan.raw(format!(".PRECIOUS: {deps}/%.d"));
        self.plan.raw(format!("{deps}/%.d: ;"));
        self.plan.raw("");
        self.plan.raw(format!("-include {deps}/*.Td {deps}/*.d"));
    }
}

/// `-L<dir>` arguments resolved against the command's directory; anything
/// else is not a library-path argument.
fn library_absolute_path(argument: &str, directory: &Path) -> Option<PathBuf> {
    let rest = argument.strip_prefix("-L")?;
    if rest.is_empty() {
        return None;
    }
    let path = Path::new(rest);
    Some(if path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    })
}
