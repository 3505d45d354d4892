//! Decides which executions were compiler invocations.
//!
//! A program counts as a compiler when its path is listed in the
//! configuration, or when its basename matches one of the patterns for the
//! gcc compiler family. Launcher wrappers (ccache, distcc) are recognized
//! separately; they carry the real compiler as their first argument.

use std::path::Path;

use lazy_static::lazy_static;

use crate::cdb::config::Compilers;
use crate::cdb::path;

/// Name patterns of the gcc compiler family. Versioned and cross prefixed
/// variants included ("gcc-12", "arm-linux-gnueabi-gcc"). Matched against
/// the basename only.
static COMPILER_PATTERNS : &[&str] = &[
    r"^(cc|c\+\+|cxx|CC)$",
    r"^([^-]*-)*[mg]cc(-?\d+(\.\d+){0,2})?$",
    r"^([^-]*-)*[mg]\+\+(-?\d+(\.\d+){0,2})?$",
    r"^([^-]*-)*[g]?fortran(-?\d+(\.\d+){0,2})?$",
];

lazy_static! {
    static ref COMPILER_PATTERN_SET : regex::RegexSet =
        regex::RegexSet::new(COMPILER_PATTERNS).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recognition {
    Compiler,
    Wrapper,
    NotACompiler,
}

pub struct Recognizer {
    compilers : Vec<String>,
    wrappers : Vec<String>,
}

// An entry with a directory separator compares against the whole program
// path, a bare name against the basename.
fn matches_entry(entry : &str, program : &Path) -> bool {
    if entry.contains('/') {
        Path::new(entry) == program
    } else {
        entry == path::basename(program)
    }
}

impl Recognizer {
    pub fn new(config : &Compilers) -> Recognizer {
        let compilers = [&config.cc, &config.cxx, &config.fortran, &config.cuda, &config.mpi]
            .iter()
            .flat_map(|list| list.iter().cloned())
            .collect();
        let wrappers = [&config.ccache, &config.distcc]
            .iter()
            .flat_map(|list| list.iter().cloned())
            .collect();
        Recognizer { compilers, wrappers }
    }

    pub fn recognize(&self, program : &Path) -> Recognition {
        if self.wrappers.iter().any(|entry| matches_entry(entry, program)) {
            Recognition::Wrapper
        } else if self.compilers.iter().any(|entry| matches_entry(entry, program))
            || COMPILER_PATTERN_SET.is_match(&path::basename(program))
        {
            Recognition::Compiler
        } else {
            Recognition::NotACompiler
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn recognizer() -> Recognizer {
        Recognizer::new(&Compilers::default())
    }

    #[test]
    fn matches_compiler_names() {
        let sut = recognizer();

        for program in &[
            "cc", "c++", "cxx", "CC",
            "gcc", "g++", "mcc",
            "gcc-12", "gcc-12.2", "g++-7.3.0",
            "arm-linux-gnueabi-gcc", "x86_64-pc-linux-gnu-g++",
            "fortran", "gfortran", "gfortran-10",
        ] {
            assert_eq!(sut.recognize(Path::new(program)), Recognition::Compiler, "{}", program);
        }
    }

    #[test]
    fn matches_against_the_basename() {
        let sut = recognizer();

        assert_eq!(sut.recognize(Path::new("/usr/bin/gcc")), Recognition::Compiler);
        assert_eq!(sut.recognize(Path::new("/usr/local/bin/g++-9")), Recognition::Compiler);
    }

    #[test]
    fn rejects_other_programs() {
        let sut = recognizer();

        for program in &["ld", "make", "gcc-musl-arm", "/usr/bin/ls", "libtool"] {
            assert_eq!(sut.recognize(Path::new(program)), Recognition::NotACompiler, "{}", program);
        }
    }

    #[test]
    fn configured_paths_are_compilers() {
        let mut config = Compilers::default();
        config.cc.push("/opt/toolchain/bin/weird-cc".to_string());
        let sut = Recognizer::new(&config);

        assert_eq!(
            sut.recognize(Path::new("/opt/toolchain/bin/weird-cc")),
            Recognition::Compiler
        );
        // A path entry does not match by basename elsewhere.
        assert_eq!(
            sut.recognize(Path::new("/usr/bin/weird-cc")),
            Recognition::NotACompiler
        );
    }

    #[test]
    fn configured_names_match_any_directory() {
        let sut = recognizer();

        assert_eq!(sut.recognize(Path::new("/usr/bin/clang")), Recognition::Compiler);
        assert_eq!(sut.recognize(Path::new("clang++")), Recognition::Compiler);
        assert_eq!(sut.recognize(Path::new("/usr/lib64/ccache/mpicc")), Recognition::Compiler);
    }

    #[test]
    fn wrappers_are_recognized_separately() {
        let sut = recognizer();

        assert_eq!(sut.recognize(Path::new("ccache")), Recognition::Wrapper);
        assert_eq!(sut.recognize(Path::new("/usr/bin/distcc")), Recognition::Wrapper);
    }

    #[test]
    fn versioned_names_need_plausible_versions() {
        let sut = recognizer();

        assert_eq!(sut.recognize(&PathBuf::from("gcc-1.2.3.4")), Recognition::NotACompiler);
    }
}
