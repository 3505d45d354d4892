//! The gcc flag grammar.
//!
//! Turns the argument list of a compiler invocation into a sequence of
//! classified flags. The grammar is a fixed list of recognizers tried in
//! priority order on every position; the first one that matches consumes the
//! flag name and its operands and emits one `CompilerFlag`.
//!
//! The tables follow the gcc option summary. Flags this tool has no special
//! interest in still need to parse correctly (their operands must not be
//! mistaken for source files), which is why the tables are this long.

use std::collections::BTreeMap;
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;

use crate::cdb::path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerFlagType {
    KindOfOutput,
    KindOfOutputNoLinking,
    KindOfOutputInfo,
    KindOfOutputOutput,
    Preprocessor,
    PreprocessorMake,
    Linker,
    LinkerObjectFile,
    DirectorySearch,
    DirectorySearchLinker,
    Source,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerFlag {
    pub arguments : Vec<String>,
    pub kind : CompilerFlagType,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FlagParseError {
    #[error("Unrecognized argument at position {position}: '{token}'")]
    UnknownArgument { position : usize, token : String },
    #[error("Missing operand for argument at position {position}: '{token}'")]
    MissingOperand { position : usize, token : String },
}

// A flag definition matches either by exact name or by a regular expression
// over the whole token, and consumes `count` operand tokens after it.
enum Matcher {
    Name(&'static str),
    Pattern(Regex),
}

struct FlagDefinition {
    matcher : Matcher,
    count : usize,
    kind : CompilerFlagType,
}

impl FlagDefinition {
    fn by_name(name : &'static str, count : usize, kind : CompilerFlagType) -> FlagDefinition {
        FlagDefinition { matcher : Matcher::Name(name), count, kind }
    }

    fn by_pattern(pattern : &str, count : usize, kind : CompilerFlagType) -> FlagDefinition {
        let re = Regex::new(&format!("^(?:{})$", pattern)).unwrap();
        FlagDefinition { matcher : Matcher::Pattern(re), count, kind }
    }

    fn matches(&self, token : &str) -> bool {
        match &self.matcher {
            Matcher::Name(name) => { token == *name }
            Matcher::Pattern(re) => { re.is_match(token) }
        }
    }
}

use CompilerFlagType::*;

lazy_static! {
    static ref KIND_OF_OUTPUT_FLAGS : Vec<FlagDefinition> = vec![
        FlagDefinition::by_name("-x", 1, KindOfOutput),
        FlagDefinition::by_name("-c", 0, KindOfOutputNoLinking),
        FlagDefinition::by_name("-S", 0, KindOfOutputNoLinking),
        FlagDefinition::by_name("-E", 0, KindOfOutputNoLinking),
        FlagDefinition::by_name("-o", 1, KindOfOutputOutput),
        FlagDefinition::by_name("-dumpbase", 1, KindOfOutput),
        FlagDefinition::by_name("-dumpbase-ext", 1, KindOfOutput),
        FlagDefinition::by_name("-dumpdir", 1, KindOfOutput),
        FlagDefinition::by_name("-v", 0, KindOfOutput),
        FlagDefinition::by_name("-###", 0, KindOfOutput),
        FlagDefinition::by_name("--help", 0, KindOfOutputInfo),
        FlagDefinition::by_name("--target-help", 0, KindOfOutputInfo),
        FlagDefinition::by_pattern("--help=(.+)", 0, KindOfOutputInfo),
        FlagDefinition::by_name("--version", 0, KindOfOutputInfo),
        FlagDefinition::by_name("-pass-exit-codes", 0, KindOfOutput),
        FlagDefinition::by_name("-pipe", 0, KindOfOutput),
        FlagDefinition::by_pattern("-specs=(.+)", 0, KindOfOutput),
        FlagDefinition::by_name("-wrapper", 1, KindOfOutput),
        FlagDefinition::by_pattern("-ffile-prefix-map=(.+)", 0, KindOfOutput),
        FlagDefinition::by_name("-fplugin", 1, KindOfOutput),
        FlagDefinition::by_pattern("-fplugin=(.+)", 0, KindOfOutput),
        FlagDefinition::by_name("-fplugin-arg-name-key", 1, KindOfOutput),
        FlagDefinition::by_pattern("-fplugin-arg-name-key=(.+)", 0, KindOfOutput),
        FlagDefinition::by_pattern("-fdump-ada-spec(.*)", 0, KindOfOutput),
        FlagDefinition::by_pattern("-fada-spec-parent=(.+)", 0, KindOfOutput),
        FlagDefinition::by_pattern("-fdump-go-spec=(.+)", 0, KindOfOutput),
        FlagDefinition::by_pattern("@(.+)", 0, KindOfOutput),
    ];

    static ref PREPROCESSOR_FLAGS : Vec<FlagDefinition> = vec![
        FlagDefinition::by_name("-A", 1, Preprocessor),
        FlagDefinition::by_pattern("-A(.+)", 0, Preprocessor),
        FlagDefinition::by_name("-D", 1, Preprocessor),
        FlagDefinition::by_pattern("-D(.+)", 0, Preprocessor),
        FlagDefinition::by_name("-U", 1, Preprocessor),
        FlagDefinition::by_pattern("-U(.+)", 0, Preprocessor),
        FlagDefinition::by_name("-include", 1, Preprocessor),
        FlagDefinition::by_name("-imacros", 1, Preprocessor),
        FlagDefinition::by_name("-undef", 0, Preprocessor),
        FlagDefinition::by_name("-pthread", 0, Preprocessor),
        FlagDefinition::by_pattern("-M(|M|G|P|D|MD)", 0, PreprocessorMake),
        FlagDefinition::by_pattern("-M(F|T|Q)", 1, PreprocessorMake),
        FlagDefinition::by_pattern("-(C|CC|P|traditional|traditional-cpp|trigraphs|remap|H)", 0, Preprocessor),
        FlagDefinition::by_pattern("-d[MDNIU]", 0, Preprocessor),
        FlagDefinition::by_name("-Xpreprocessor", 1, Preprocessor),
        FlagDefinition::by_pattern("-Wp,(.+)", 0, Preprocessor),
    ];

    static ref DIRECTORY_SEARCH_FLAGS : Vec<FlagDefinition> = vec![
        FlagDefinition::by_name("-I", 1, DirectorySearch),
        FlagDefinition::by_pattern("-I(.+)", 0, DirectorySearch),
        FlagDefinition::by_name("-iplugindir", 1, DirectorySearch),
        FlagDefinition::by_pattern("-iplugindir=(.+)", 0, DirectorySearch),
        FlagDefinition::by_pattern("-i(.*)", 1, DirectorySearch),
        FlagDefinition::by_pattern(r"-no(stdinc|stdinc\+\+|-canonical-prefixes|-sysroot-suffix)", 0, DirectorySearch),
        FlagDefinition::by_name("-L", 1, DirectorySearchLinker),
        FlagDefinition::by_pattern("-L(.+)", 0, DirectorySearchLinker),
        FlagDefinition::by_name("-B", 1, DirectorySearch),
        FlagDefinition::by_pattern("-B(.+)", 0, DirectorySearch),
        FlagDefinition::by_name("--sysroot", 1, DirectorySearch),
        FlagDefinition::by_pattern("--sysroot=(.+)", 0, DirectorySearch),
    ];

    static ref LINKER_FLAGS : Vec<FlagDefinition> = vec![
        FlagDefinition::by_pattern("-flinker-output=(.+)", 0, Linker),
        FlagDefinition::by_pattern("-fuse-ld=(.+)", 0, Linker),
        FlagDefinition::by_name("-l", 1, Linker),
        FlagDefinition::by_pattern("-l(.+)", 0, Linker),
        FlagDefinition::by_pattern("-no(startfiles|defaultlibs|libc|stdlib)", 0, Linker),
        FlagDefinition::by_name("-e", 1, Linker),
        FlagDefinition::by_pattern("-entry=(.+)", 0, Linker),
        FlagDefinition::by_pattern("-(pie|no-pie|static-pie)", 0, Linker),
        FlagDefinition::by_pattern("-(r|rdynamic|s|symbolic)", 0, Linker),
        FlagDefinition::by_pattern("-(static|shared)(|-libgcc)", 0, Linker),
        FlagDefinition::by_pattern(r"-static-lib(asan|tsan|lsan|ubsan|stdc\+\+)", 0, Linker),
        FlagDefinition::by_name("-T", 1, Linker),
        FlagDefinition::by_name("-Xlinker", 1, Linker),
        FlagDefinition::by_pattern("-Wl,(.+)", 0, Linker),
        FlagDefinition::by_name("-u", 1, Linker),
        FlagDefinition::by_name("-z", 1, Linker),
    ];

    static ref EVERYTHING_ELSE_FLAGS : Vec<FlagDefinition> = vec![
        FlagDefinition::by_name("-Xassembler", 1, Other),
        FlagDefinition::by_pattern("-Wa,(.*)", 0, Other),
        FlagDefinition::by_name("-ansi", 0, Other),
        FlagDefinition::by_name("-aux-info", 1, Other),
        FlagDefinition::by_pattern("-std=(.*)", 0, Other),
        FlagDefinition::by_pattern("-[Og](.*)", 0, Other),
        FlagDefinition::by_pattern("-[fmpW](.+)", 0, Other),
        FlagDefinition::by_pattern("-(no|tno|save|d)(.+)", 0, Other),
        FlagDefinition::by_pattern("-[EQXY](.+)", 0, Other),
        FlagDefinition::by_pattern("--(.+)", 0, Other),
        FlagDefinition::by_pattern(".+", 0, LinkerObjectFile),
    ];
}

// File extensions the compiler drivers treat as input sources.
static SOURCE_EXTENSIONS : &[&str] = &[
    // header files
    ".h", ".hh", ".H", ".hp", ".hxx", ".hpp", ".HPP", ".h++", ".tcc",
    // C
    ".c", ".C",
    // C++
    ".cc", ".CC", ".c++", ".C++", ".cxx", ".cpp", ".cp",
    // Objective-C
    ".m", ".mi", ".mm", ".M", ".mii",
    // preprocessed
    ".i", ".ii",
    // assembly
    ".s", ".S", ".sx", ".asm",
    // Fortran
    ".f", ".for", ".ftn",
    ".F", ".FOR", ".fpp", ".FPP", ".FTN",
    ".f90", ".f95", ".f03", ".f08",
    ".F90", ".F95", ".F03", ".F08",
    // go
    ".go",
    // brig
    ".brig",
    // D
    ".d", ".di", ".dd",
    // Ada
    ".ads", ".abd",
];

fn take_extension(file : &str) -> &str {
    match file.rfind('.') {
        None => { file }
        Some(position) => { &file[position..] }
    }
}

fn is_source(token : &str) -> bool {
    let candidate = take_extension(token);
    SOURCE_EXTENSIONS.iter().any(|extension| candidate == *extension)
}

fn lookup(table : &[FlagDefinition], token : &str) -> Option<(usize, CompilerFlagType)> {
    table.iter()
        .find(|definition| definition.matches(token))
        .map(|definition| (definition.count, definition.kind))
}

/// Parse a compiler argument list (without the program name) into flags.
///
/// The recognizers run in a fixed priority order on every position, so an
/// ambiguous token like `-MD` is claimed by the preprocessor table before
/// the catch-all would see it.
pub fn parse(arguments : &[String]) -> Result<Vec<CompilerFlag>, FlagParseError> {
    let mut flags = Vec::new();
    let mut position = 0;

    while position < arguments.len() {
        let token = &arguments[position];
        let hit = lookup(&KIND_OF_OUTPUT_FLAGS, token)
            .or_else(|| lookup(&PREPROCESSOR_FLAGS, token))
            .or_else(|| lookup(&DIRECTORY_SEARCH_FLAGS, token))
            .or_else(|| lookup(&LINKER_FLAGS, token))
            .or_else(|| if is_source(token) { Some((0, Source)) } else { None })
            .or_else(|| lookup(&EVERYTHING_ELSE_FLAGS, token));

        match hit {
            None => {
                return Err(FlagParseError::UnknownArgument {
                    position,
                    token : token.clone(),
                });
            }
            Some((count, kind)) => {
                let end = position + count + 1;
                if end > arguments.len() {
                    return Err(FlagParseError::MissingOperand {
                        position,
                        token : token.clone(),
                    });
                }
                flags.push(CompilerFlag {
                    arguments : arguments[position..end].to_vec(),
                    kind,
                });
                position = end;
            }
        }
    }
    Ok(flags)
}

/// Synthetic include flags derived from the preprocessor environment.
///
/// Every component of the include path variables becomes a `-I` (or
/// `-isystem`) flag; an empty component stands for the current directory.
pub fn from_environment(environment : &BTreeMap<String, String>) -> Vec<CompilerFlag> {
    let mut flags = Vec::new();
    for key in &["CPATH", "C_INCLUDE_PATH", "CPLUS_INCLUDE_PATH"] {
        if let Some(value) = environment.get(*key) {
            for component in path::split(value) {
                let directory = if component.is_empty() { ".".to_string() } else { component };
                flags.push(CompilerFlag {
                    arguments : vec!["-I".to_string(), directory],
                    kind : DirectorySearch,
                });
            }
        }
    }
    if let Some(value) = environment.get("OBJC_INCLUDE_PATH") {
        for component in path::split(value) {
            let directory = if component.is_empty() { ".".to_string() } else { component };
            flags.push(CompilerFlag {
                arguments : vec!["-isystem".to_string(), directory],
                kind : DirectorySearch,
            });
        }
    }
    flags
}

/// Parse the argument list and append the environment derived flags.
pub fn parse_with_environment(
    arguments : &[String],
    environment : &BTreeMap<String, String>,
) -> Result<Vec<CompilerFlag>, FlagParseError> {
    let mut flags = parse(arguments)?;
    flags.extend(from_environment(environment));
    Ok(flags)
}

/// Whether the invocation performs a compilation pass at all.
///
/// Version or help queries compile nothing. So does `-M`/`-MM` dependency
/// generation, which would only produce duplicate entries that are hard to
/// detect later.
pub fn runs_compilation_pass(flags : &[CompilerFlag]) -> bool {
    if flags.is_empty() {
        return false;
    }
    if flags.iter().any(|flag| flag.kind == KindOfOutputInfo) {
        return false;
    }
    let dependency_only = flags.iter().any(|flag| {
        flag.kind == PreprocessorMake
            && flag.arguments.first().map(String::as_str).map_or(false, |name| name == "-M" || name == "-MM")
    });
    !dependency_only
}

/// Whether the invocation stops after the preprocessor (`-E`).
pub fn asks_preprocessing_only(flags : &[CompilerFlag]) -> bool {
    flags.iter().any(|flag| {
        flag.kind == KindOfOutputNoLinking
            && flag.arguments.first().map(String::as_str) == Some("-E")
    })
}

pub fn source_files(flags : &[CompilerFlag]) -> Vec<PathBuf> {
    flags.iter()
        .filter(|flag| flag.kind == Source)
        .filter_map(|flag| flag.arguments.first())
        .map(PathBuf::from)
        .collect()
}

pub fn output_file(flags : &[CompilerFlag]) -> Option<PathBuf> {
    flags.iter()
        .find(|flag| flag.kind == KindOfOutputOutput)
        .and_then(|flag| flag.arguments.last())
        .map(PathBuf::from)
}

/// The argument list of a compile-only invocation for a single source.
///
/// Keeps the flags in their original order, drops the linker business and
/// the make dependency flags, and drops every source other than the given
/// one. When the original invocation would have linked, a `-c` is placed
/// up front.
pub fn filter_arguments(flags : &[CompilerFlag], source : &std::path::Path) -> Vec<String> {
    fn filtered_out(kind : CompilerFlagType) -> bool {
        matches!(kind, Linker | PreprocessorMake | DirectorySearchLinker)
    }

    let no_linking = flags.iter().any(|flag| flag.kind == KindOfOutputNoLinking);

    let mut result = Vec::new();
    if !no_linking {
        result.push("-c".to_string());
    }
    for flag in flags {
        if filtered_out(flag.kind) {
            continue;
        }
        if flag.kind == Source
            && flag.arguments.first().map(PathBuf::from).as_deref() != Some(source)
        {
            continue;
        }
        result.extend(flag.arguments.iter().cloned());
    }
    result
}
