//! Runtime configuration of the compilation database creation.
//!
//! Everything has a sensible default, so the configuration file is optional.
//! Fields that are not present in the file keep their defaults.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cdb::database::EntryField;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub compilers : Compilers,
    pub content : Content,
    pub format : Format,
}

/// Compiler and wrapper names or paths to recognize, beyond the built-in
/// name patterns. An entry with a directory separator compares against the
/// full program path, a bare name compares against its basename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Compilers {
    pub cc : Vec<String>,
    pub cxx : Vec<String>,
    pub fortran : Vec<String>,
    pub cuda : Vec<String>,
    pub mpi : Vec<String>,
    pub ccache : Vec<String>,
    pub distcc : Vec<String>,
}

impl Default for Compilers {
    fn default() -> Self {
        // The name patterns cover the gcc family; clang and the usual
        // launcher wrappers have to be listed explicitly.
        Compilers {
            cc : vec!["clang".to_string()],
            cxx : vec!["clang++".to_string()],
            fortran : vec![],
            cuda : vec!["nvcc".to_string()],
            mpi : vec!["mpicc".to_string(), "mpicxx".to_string(), "mpic++".to_string(), "mpifort".to_string()],
            ccache : vec!["ccache".to_string()],
            distcc : vec!["distcc".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    pub include_only_existing_source : bool,
    pub paths_to_include : Vec<PathBuf>,
    pub paths_to_exclude : Vec<PathBuf>,
    pub relative_to : Option<PathBuf>,
    pub duplicate_filter_fields : Vec<EntryField>,
}

impl Default for Content {
    fn default() -> Self {
        Content {
            include_only_existing_source : false,
            paths_to_include : vec![],
            paths_to_exclude : vec![],
            relative_to : None,
            duplicate_filter_fields : EntryField::all(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Format {
    pub command_as_array : bool,
    pub drop_output_field : bool,
}

impl Default for Format {
    fn default() -> Self {
        Format {
            command_as_array : true,
            drop_output_field : false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed configuration file: {0}")]
    Syntax(#[from] serde_json::Error),
}

impl Configuration {
    pub fn from_file(file : &Path) -> Result<Configuration, ConfigurationError> {
        let source = File::open(file)?;
        let configuration = serde_json::from_reader(BufReader::new(source))?;
        Ok(configuration)
    }

    /// The default configuration, extended with the compilers the build
    /// environment names in the `CC`, `CXX` and `FC` variables.
    pub fn from_environment(environment : &BTreeMap<String, String>) -> Configuration {
        fn extend(list : &mut Vec<String>, value : Option<&String>) {
            if let Some(value) = value {
                if !value.is_empty() {
                    list.push(value.clone());
                }
            }
        }

        let mut configuration = Configuration::default();
        extend(&mut configuration.compilers.cc, environment.get("CC"));
        extend(&mut configuration.compilers.cxx, environment.get("CXX"));
        extend(&mut configuration.compilers.fortran, environment.get("FC"));
        configuration
    }
}
