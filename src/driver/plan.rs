//! Drives one native-plan emission end to end: database in, rendered
//! build plan out. Mirrors the shape of the core emitter's lifecycle:
//! preamble, stubs, link DAG, then the per-test fork.

use std::path::PathBuf;

use indexmap::IndexSet;

use crate::core::build::database::BuildDatabase;
use crate::core::diag::PlanError;
use crate::core::plan::native::{BuildResult, NativePlanEmitter};
use crate::core::project::ProjectContext;

/// Everything one plan emission needs besides the database itself.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub project: ProjectContext,
    /// Link output chosen as the traversal root.
    pub root: PathBuf,
    pub primary_compiler: PathBuf,
    /// Original sources replaced by stubs for this run.
    pub stub_sources: IndexSet<PathBuf>,
    /// Generated stub files compiled into `$(STUB_OBJECT_FILES)`.
    pub stub_files: IndexSet<PathBuf>,
    /// Source file whose generated test the plan builds and runs.
    pub test_source: PathBuf,
    /// Rewrite the root executable's link into a shared library.
    pub transform_exe_to_lib: bool,
    /// Suffix applied to link outputs with mixed stub provenance.
    pub suffix_for_parent_of_stubs: String,
    /// Absolute roots bound to shell variables in the emitted plan.
    pub substitutions: Vec<(PathBuf, String)>,
}

pub struct PlanOutput {
    /// Rendered POSIX-make text.
    pub text: String,
    /// Build result of the traversal root.
    pub root_result: BuildResult,
}

/// Emits the complete plan for one test source.
pub fn emit_native_plan(
    database: &BuildDatabase,
    request: PlanRequest,
) -> Result<PlanOutput, PlanError> {
    let mut emitter = NativePlanEmitter::new(
        request.project,
        database,
        request.root.clone(),
        &request.primary_compiler,
        request.stub_sources,
        request.substitutions,
    )?;
    emitter.add_stubs(&request.stub_files)?;
    let root_result = emitter.emit_link_targets(
        &request.root,
        &request.suffix_for_parent_of_stubs,
        request.transform_exe_to_lib,
    )?;
    let forked = emitter.fork_for_test(&request.test_source)?;
    Ok(PlanOutput {
        text: forked.render(),
        root_result,
    })
}
