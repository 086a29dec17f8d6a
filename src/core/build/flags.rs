//! Compiler/linker argument taxonomy and `-Wl,…` normalization.
//!
//! Removal operations over commands are predicate-driven on [`FlagKind`],
//! never on ad-hoc string matching at the call site. The `-Wl,…` form is
//! treated as a comma-separated vector whose entries are filtered
//! individually; a vector collapsing to the bare `-Wl` means the argument
//! disappears entirely.

/// Deny-list of options the instrumented test compile cannot carry:
/// freestanding/hosted toggles, OpenMP/OpenACC, explicit language-standard
/// variants, signedness overrides, GNU-inline and vector/laxity toggles.
pub const UNSUPPORTED_FLAGS_AND_OPTIONS: &[&str] = &[
    "-ansi",
    "-fallow-parameterless-variadic-functions",
    "-fallow-single-precision",
    "-fcond-mismatch",
    "-ffreestanding",
    "-fgimple",
    "-fgnu89-inline",
    "-fhosted",
    "-flax-vector-conversions",
    "-fms-extensions",
    "-fno-asm",
    "-fno-builtin",
    "-fno-builtin-function",
    "-fopenacc",
    "-fopenacc-dim",
    "-fopenacc-kernels",
    "-fopenmp",
    "-fopenmp-simd",
    "-fpermitted-flt-eval-methods",
    "-fplan9-extensions",
    "-fsigned-bitfields",
    "-fsigned-char",
    "-fsso-struct",
    "-funsigned-bitfields",
    "-funsigned-char",
    "-std",
];

/// Categories every command argument falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Optimization,
    Pic,
    Sanitizer,
    Coverage,
    LinkScript,
    Soname,
    Include,
    LibraryDir,
    LibraryName,
    Static,
    Shared,
    Relocate,
    Unsupported,
    Other,
}

/// Classifies a single argument. Input paths and anything unrecognized
/// classify as [`FlagKind::Other`].
pub fn classify(argument: &str) -> FlagKind {
    if UNSUPPORTED_FLAGS_AND_OPTIONS.contains(&argument)
        || argument.starts_with("-std=")
        || argument.starts_with("-std:")
    {
        return FlagKind::Unsupported;
    }
    if argument == "-fPIC" || argument == "-fpic" {
        return FlagKind::Pic;
    }
    if argument.starts_with("-fsanitize") || argument.starts_with("-fno-sanitize") {
        return FlagKind::Sanitizer;
    }
    if argument == "--coverage"
        || argument.starts_with("-fprofile-")
        || argument.starts_with("-fcoverage-")
        || argument == "-ftest-coverage"
    {
        return FlagKind::Coverage;
    }
    if argument.starts_with("-Wl,") {
        if argument.contains("--version-script") {
            return FlagKind::LinkScript;
        }
        if argument.contains("-soname") {
            return FlagKind::Soname;
        }
        return FlagKind::Other;
    }
    if argument.starts_with("-O") {
        return FlagKind::Optimization;
    }
    if argument.starts_with("-I") || argument.starts_with("-iquote") {
        return FlagKind::Include;
    }
    if argument.starts_with("-L") {
        return FlagKind::LibraryDir;
    }
    if argument.starts_with("-l") {
        return FlagKind::LibraryName;
    }
    match argument {
        "-static" => FlagKind::Static,
        "-shared" => FlagKind::Shared,
        "-r" => FlagKind::Relocate,
        _ => FlagKind::Other,
    }
}

fn erase_if_wl_only(argument: &mut String) {
    if argument == "-Wl" {
        argument.clear();
    }
}

/// Drops every comma-separated entry of `argument` starting with `flag`.
/// Arguments without a matching entry are left untouched.
pub fn remove_linker_flag(argument: &mut String, flag: &str) {
    let options: Vec<&str> = argument.split(',').collect();
    let kept: Vec<&str> = options
        .iter()
        .copied()
        .filter(|option| !option.starts_with(flag))
        .collect();
    if kept.len() == options.len() {
        return;
    }
    *argument = kept.join(",");
    erase_if_wl_only(argument);
}

/// Strips `--version-script=<path>` entries from a linker argument.
pub fn remove_script_flag(argument: &mut String) {
    remove_linker_flag(argument, "--version-script");
}

/// Strips the `-soname <name>` pair from a linker argument.
pub fn remove_soname_flag(argument: &mut String) {
    let mut soname_next = false;
    let kept: Vec<&str> = argument
        .split(',')
        .filter(|option| {
            if soname_next {
                soname_next = false;
                return false;
            }
            if *option == "-soname" {
                soname_next = true;
                return false;
            }
            true
        })
        .collect();
    *argument = kept.join(",");
    erase_if_wl_only(argument);
}

/// Rewrites `-Wl,a,b,c` into `a b c` for arguments re-targeted directly at
/// the linker. Non-`-Wl` arguments pass through unchanged.
pub fn transform_compiler_flags_to_linker_flags(argument: &mut String) {
    let mut options = argument.split(',');
    if options.next() != Some("-Wl") {
        return;
    }
    *argument = options.collect::<Vec<&str>>().join(" ");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_taxonomy() {
        assert_eq!(classify("-O2"), FlagKind::Optimization);
        assert_eq!(classify("-fPIC"), FlagKind::Pic);
        assert_eq!(classify("-fsanitize=address"), FlagKind::Sanitizer);
        assert_eq!(classify("--coverage"), FlagKind::Coverage);
        assert_eq!(classify("-Wl,--version-script=v.lds"), FlagKind::LinkScript);
        assert_eq!(classify("-Wl,-soname,libx.so"), FlagKind::Soname);
        assert_eq!(classify("-Iinclude"), FlagKind::Include);
        assert_eq!(classify("-iquote/src"), FlagKind::Include);
        assert_eq!(classify("-L/lib"), FlagKind::LibraryDir);
        assert_eq!(classify("-lm"), FlagKind::LibraryName);
        assert_eq!(classify("-std=gnu99"), FlagKind::Unsupported);
        assert_eq!(classify("-fopenmp"), FlagKind::Unsupported);
        assert_eq!(classify("a.o"), FlagKind::Other);
    }

    #[test]
    fn soname_and_script_removal() {
        let mut arg = "-Wl,-soname,libx.so.1,--version-script=v.lds,-rpath,/lib".to_string();
        remove_soname_flag(&mut arg);
        remove_script_flag(&mut arg);
        assert_eq!(arg, "-Wl,-rpath,/lib");
    }

    #[test]
    fn removal_is_idempotent() {
        let mut arg = "-Wl,-soname,libx.so.1".to_string();
        remove_soname_flag(&mut arg);
        let once = arg.clone();
        remove_soname_flag(&mut arg);
        assert_eq!(arg, once);

        let mut arg = "-Wl,--version-script=v.lds,-z,now".to_string();
        remove_script_flag(&mut arg);
        let once = arg.clone();
        remove_script_flag(&mut arg);
        assert_eq!(arg, once);
    }

    #[test]
    fn wl_only_argument_collapses_to_empty() {
        let mut arg = "-Wl,-soname,libx.so".to_string();
        remove_soname_flag(&mut arg);
        assert!(arg.is_empty());
    }

    #[test]
    fn direct_linker_expansion() {
        let mut arg = "-Wl,-rpath,/lib".to_string();
        transform_compiler_flags_to_linker_flags(&mut arg);
        assert_eq!(arg, "-rpath /lib");

        let mut plain = "-r".to_string();
        transform_compiler_flags_to_linker_flags(&mut plain);
        assert_eq!(plain, "-r");
    }
}
