//! Post processing filter over the created entries.

use std::path::PathBuf;

use crate::cdb::config::Content;
use crate::cdb::database::Entry;
use crate::cdb::path;

/// Decides which entries make it into the output.
///
/// The strict mode re-checks the entries against the filesystem and the
/// configured directory lists; the default mode accepts everything the
/// semantic transform produced.
pub enum EntryFilter {
    NoFilter,
    StrictFilter {
        paths_to_include : Vec<PathBuf>,
        paths_to_exclude : Vec<PathBuf>,
    },
}

impl EntryFilter {
    pub fn new(content : &Content, run_checks : bool) -> EntryFilter {
        if run_checks || content.include_only_existing_source {
            EntryFilter::StrictFilter {
                paths_to_include : content.paths_to_include.clone(),
                paths_to_exclude : content.paths_to_exclude.clone(),
            }
        } else {
            EntryFilter::NoFilter
        }
    }

    pub fn accepts(&self, entry : &Entry) -> bool {
        match self {
            EntryFilter::NoFilter => { true }
            EntryFilter::StrictFilter { paths_to_include, paths_to_exclude } => {
                entry.file.exists()
                    && (paths_to_include.is_empty()
                        || paths_to_include.iter().any(|root| path::contains(root, &entry.file)))
                    && !paths_to_exclude.iter().any(|root| path::contains(root, &entry.file))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(file : PathBuf) -> Entry {
        Entry {
            file,
            directory : PathBuf::from("/somewhere"),
            output : None,
            arguments : vec!["cc".to_string()],
        }
    }

    #[test]
    fn no_filter_accepts_everything() {
        let sut = EntryFilter::new(&Content::default(), false);

        assert!(sut.accepts(&entry(PathBuf::from("/no/such/file.c"))));
    }

    #[test]
    fn strict_filter_requires_the_file_to_exist() -> anyhow::Result<()> {
        let directory = tempfile::tempdir()?;
        let existing = directory.path().join("present.c");
        std::fs::write(&existing, "int main() { return 0; }")?;

        let sut = EntryFilter::new(&Content::default(), true);

        assert!(sut.accepts(&entry(existing)));
        assert!(!sut.accepts(&entry(directory.path().join("absent.c"))));
        Ok(())
    }

    #[test]
    fn strict_filter_applies_the_directory_lists() -> anyhow::Result<()> {
        let directory = tempfile::tempdir()?;
        let source = directory.path().join("src");
        let vendor = directory.path().join("vendor");
        std::fs::create_dir_all(&source)?;
        std::fs::create_dir_all(&vendor)?;
        let included = source.join("a.c");
        let excluded = vendor.join("b.c");
        std::fs::write(&included, "")?;
        std::fs::write(&excluded, "")?;

        let content = Content {
            include_only_existing_source : true,
            paths_to_include : vec![source],
            paths_to_exclude : vec![vendor],
            ..Content::default()
        };
        let sut = EntryFilter::new(&content, false);

        assert!(sut.accepts(&entry(included)));
        assert!(!sut.accepts(&entry(excluded)));
        Ok(())
    }
}
