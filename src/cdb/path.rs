use std::path::{Component, Path, PathBuf};

pub const OS_PATH_SEPARATOR : char = ':';

/// Split a PATH-style list into its components.
///
/// The empty string yields the empty list. Adjacent separators yield empty
/// components; the include-path handling relies on seeing them (an empty
/// member of CPATH means the current directory).
pub fn split(input : &str) -> Vec<String> {
    if input.is_empty() {
        return Vec::new();
    }
    input.split(OS_PATH_SEPARATOR).map(str::to_string).collect()
}

/// Join path list components with the separator.
///
/// Left inverse of `split` for lists without empty components.
pub fn join(input : &[String]) -> String {
    input.join(&OS_PATH_SEPARATOR.to_string())
}

pub fn basename(input : &Path) -> String {
    input.file_name()
        .map(|it| it.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn concat(dir : &Path, file : &Path) -> PathBuf {
    dir.join(file)
}

// Path components with the `.` entries dropped. Symlinks are not resolved,
// and `..` entries are kept as they are.
fn components(input : &Path) -> Vec<Component> {
    input.components()
        .filter(|it| !matches!(it, Component::CurDir))
        .collect()
}

/// The shortest relative path that leads from `base` to `path`.
///
/// Both inputs are expected to be absolute. The result starts with `./` when
/// `base` contains `path`, and climbs with `..` entries otherwise.
pub fn relative(path : &Path, base : &Path) -> PathBuf {
    let path_components = components(path);
    let base_components = components(base);

    let common = path_components.iter()
        .zip(base_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    if base_components.len() == common {
        result.push(".");
    } else {
        for _ in common..base_components.len() {
            result.push("..");
        }
    }
    for component in &path_components[common..] {
        result.push(component);
    }
    result
}

/// True if `root` is a path-component prefix of `file`.
///
/// This is not a string prefix check: `/path` contains `/path/to`,
/// but not `/pathology`.
pub fn contains(root : &Path, file : &Path) -> bool {
    let root_components = components(root);
    let file_components = components(file);

    root_components.len() <= file_components.len()
        && root_components.iter().zip(file_components.iter()).all(|(a, b)| a == b)
}

fn is_executable(path : &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|it| it.is_file() && (it.permissions().mode() & 0o111 != 0))
        .unwrap_or(false)
}

/// Locate an executable the way the shell would.
///
/// A candidate with a directory separator is taken as a path relative to the
/// working directory. Anything else is searched in the given PATH value,
/// ignoring empty entries.
pub fn lookup(file : &Path, search_path : Option<&str>) -> Option<PathBuf> {
    if file.components().count() > 1 || file.is_absolute() {
        let candidate = file.canonicalize().ok()?;
        return if is_executable(&candidate) { Some(candidate) } else { None };
    }
    for prefix in split(search_path.unwrap_or_default()) {
        if prefix.is_empty() {
            continue;
        }
        let candidate = Path::new(&prefix).join(file);
        if let Ok(resolved) = candidate.canonicalize() {
            if is_executable(&resolved) {
                return Some(resolved);
            }
        }
    }
    None
}
