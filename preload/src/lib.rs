//! The preload shim.
//!
//! The dynamic linker loads this library into every process of the
//! intercepted build. It interposes the exec family of libc calls and
//! reroutes them through the supervisor executable: the supervisor reports
//! the execution to the collector, then runs the original program with its
//! original argument list.
//!
//! The shim must stay invisible. When the session environment is absent the
//! calls are forwarded to the real libc symbols unchanged, and on failure
//! the native error codes are produced, exactly as the intercepted call
//! would have produced them. Only the argument vector handed to the real
//! `execve` differs; the caller's environment pointer is forwarded
//! untouched (the session travels in well-known environment variables that
//! the collector exported once, upstream).

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStringExt;

use lazy_static::lazy_static;
use libc::{c_char, c_int, pid_t};

use earshot::cdb::session;

struct Session {
    reporter : CString,
    destination : CString,
    verbose : bool,
}

fn read_session() -> Option<Session> {
    // The session is valid when all three variables are present.
    let _library = std::env::var_os(session::KEY_LIBRARY)?;
    let reporter = std::env::var_os(session::KEY_REPORTER)?;
    let destination = std::env::var_os(session::KEY_DESTINATION)?;
    let verbose = std::env::var(session::KEY_VERBOSE)
        .map(|value| session::is_truthy(&value))
        .unwrap_or(false);

    Some(Session {
        reporter : CString::new(reporter.into_vec()).ok()?,
        destination : CString::new(destination.into_vec()).ok()?,
        verbose,
    })
}

fn resolve_next(name : &'static [u8]) -> usize {
    unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr().cast()) as usize }
}

lazy_static! {
    static ref SESSION : Option<Session> = read_session();

    // The real libc entry points, resolved past this library.
    static ref REAL_EXECVE : usize = resolve_next(b"execve\0");
    static ref REAL_EXECVPE : usize = resolve_next(b"execvpe\0");
    static ref REAL_POSIX_SPAWN : usize = resolve_next(b"posix_spawn\0");
    static ref REAL_POSIX_SPAWNP : usize = resolve_next(b"posix_spawnp\0");
}

type ExecveFn = unsafe extern "C" fn(
    *const c_char,
    *const *const c_char,
    *const *const c_char,
) -> c_int;

type SpawnFn = unsafe extern "C" fn(
    *mut pid_t,
    *const c_char,
    *const libc::posix_spawn_file_actions_t,
    *const libc::posix_spawnattr_t,
    *const *const c_char,
    *const *const c_char,
) -> c_int;

extern "C" {
    #[allow(non_upper_case_globals)]
    static environ : *const *const c_char;
}

unsafe fn set_errno(code : c_int) {
    *libc::__errno_location() = code;
}

unsafe fn call_real_execve(
    next : usize,
    path : *const c_char,
    argv : *const *const c_char,
    envp : *const *const c_char,
) -> c_int {
    if next == 0 {
        set_errno(libc::ENOSYS);
        return -1;
    }
    let real : ExecveFn = std::mem::transmute(next);
    real(path, argv, envp)
}

unsafe fn call_real_spawn(
    next : usize,
    pid : *mut pid_t,
    path : *const c_char,
    file_actions : *const libc::posix_spawn_file_actions_t,
    attrp : *const libc::posix_spawnattr_t,
    argv : *const *const c_char,
    envp : *const *const c_char,
) -> c_int {
    if next == 0 {
        return libc::ENOSYS;
    }
    let real : SpawnFn = std::mem::transmute(next);
    real(pid, path, file_actions, attrp, argv, envp)
}

// Path resolution. It reproduces the semantics of the intercepted calls:
// the supervisor receives a path that the original call would have
// executed, and the caller receives the errno the original call would
// have failed with.

fn has_dir_separator(file : &CStr) -> bool {
    file.to_bytes().contains(&b'/')
}

fn from_current_directory(file : &CStr) -> Result<CString, c_int> {
    let resolved = unsafe { libc::realpath(file.as_ptr(), std::ptr::null_mut()) };
    if resolved.is_null() {
        return Err(libc::ENOENT);
    }
    let path = unsafe { CStr::from_ptr(resolved) }.to_owned();
    unsafe { libc::free(resolved.cast()) };

    if unsafe { libc::access(path.as_ptr(), libc::X_OK) } == 0 {
        Ok(path)
    } else if unsafe { libc::access(path.as_ptr(), libc::F_OK) } == 0 {
        Err(libc::EACCES)
    } else {
        Err(libc::ENOENT)
    }
}

fn from_search_path(file : &CStr, search_path : &[u8]) -> Result<CString, c_int> {
    if has_dir_separator(file) {
        return from_current_directory(file);
    }
    for prefix in search_path.split(|it| *it == b':') {
        // ignore empty entries
        if prefix.is_empty() {
            continue;
        }
        let mut buffer = Vec::with_capacity(prefix.len() + file.to_bytes().len() + 1);
        buffer.extend_from_slice(prefix);
        buffer.push(b'/');
        buffer.extend_from_slice(file.to_bytes());
        let candidate = match CString::new(buffer) {
            Err(_) => { continue; }
            Ok(candidate) => { candidate }
        };
        if let Ok(resolved) = from_current_directory(&candidate) {
            return Ok(resolved);
        }
    }
    Err(libc::ENOENT)
}

unsafe fn from_path(file : &CStr, envp : *const *const c_char) -> Result<CString, c_int> {
    if has_dir_separator(file) {
        return from_current_directory(file);
    }
    // search the PATH of the supplied environment, not the caller's one
    if let Some(paths) = get_env_value(envp, b"PATH") {
        return from_search_path(file, &paths);
    }
    // fall back to the system configuration when PATH is not set
    match confstr_path() {
        None => { Err(libc::ENOENT) }
        Some(paths) => { from_search_path(file, &paths) }
    }
}

unsafe fn get_env_value(envp : *const *const c_char, key : &[u8]) -> Option<Vec<u8>> {
    if envp.is_null() {
        return None;
    }
    let mut it = envp;
    while !(*it).is_null() {
        let entry = CStr::from_ptr(*it).to_bytes();
        if entry.len() > key.len() && &entry[..key.len()] == key && entry[key.len()] == b'=' {
            return Some(entry[key.len() + 1..].to_vec());
        }
        it = it.add(1);
    }
    None
}

fn confstr_path() -> Option<Vec<u8>> {
    unsafe {
        let length = libc::confstr(libc::_CS_PATH, std::ptr::null_mut(), 0);
        if length == 0 {
            return None;
        }
        let mut buffer = vec![0u8; length];
        if libc::confstr(libc::_CS_PATH, buffer.as_mut_ptr().cast(), length) == 0 {
            return None;
        }
        // drop the terminating NUL
        buffer.pop();
        Some(buffer)
    }
}

fn literal(value : &str) -> CString {
    // The session flag names contain no NUL bytes.
    CString::new(value).unwrap()
}

// The rewritten argument vector. The strings own the content; the pointer
// vector stays valid as long as this value lives, which is until the real
// exec call either replaced the process or failed.
struct SupervisedCommand {
    _strings : Vec<CString>,
    pointers : Vec<*const c_char>,
}

impl SupervisedCommand {
    unsafe fn new(session : &Session, resolved : &CStr, argv : *const *const c_char) -> SupervisedCommand {
        let mut strings = vec![
            session.reporter.clone(),
            literal(session::FLAG_DESTINATION),
            session.destination.clone(),
        ];
        if session.verbose {
            strings.push(literal(session::FLAG_VERBOSE));
        }
        strings.push(literal(session::FLAG_EXECUTE));
        strings.push(resolved.to_owned());
        strings.push(literal(session::FLAG_COMMAND));
        if !argv.is_null() {
            let mut it = argv;
            while !(*it).is_null() {
                strings.push(CStr::from_ptr(*it).to_owned());
                it = it.add(1);
            }
        }

        let mut pointers : Vec<*const c_char> = strings.iter().map(|it| it.as_ptr()).collect();
        pointers.push(std::ptr::null());
        SupervisedCommand { _strings : strings, pointers }
    }

    fn file(&self) -> *const c_char {
        self.pointers[0]
    }

    fn argv(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }
}

/// # Safety
///
/// Called by the C runtime with the calling convention and pointer
/// contracts of libc's `execve`.
#[no_mangle]
pub unsafe extern "C" fn execve(
    path : *const c_char,
    argv : *const *const c_char,
    envp : *const *const c_char,
) -> c_int {
    let session = match SESSION.as_ref() {
        None => {
            return call_real_execve(*REAL_EXECVE, path, argv, envp);
        }
        Some(session) => { session }
    };
    if path.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    match from_current_directory(CStr::from_ptr(path)) {
        Err(code) => {
            set_errno(code);
            -1
        }
        Ok(resolved) => {
            let command = SupervisedCommand::new(session, &resolved, argv);
            call_real_execve(*REAL_EXECVE, command.file(), command.argv(), envp)
        }
    }
}

/// # Safety
///
/// Called by the C runtime with the calling convention and pointer
/// contracts of libc's `execvpe`.
#[no_mangle]
pub unsafe extern "C" fn execvpe(
    file : *const c_char,
    argv : *const *const c_char,
    envp : *const *const c_char,
) -> c_int {
    let session = match SESSION.as_ref() {
        None => {
            return call_real_execve(*REAL_EXECVPE, file, argv, envp);
        }
        Some(session) => { session }
    };
    if file.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    match from_path(CStr::from_ptr(file), envp) {
        Err(code) => {
            set_errno(code);
            -1
        }
        Ok(resolved) => {
            let command = SupervisedCommand::new(session, &resolved, argv);
            call_real_execve(*REAL_EXECVE, command.file(), command.argv(), envp)
        }
    }
}

/// # Safety
///
/// Called by the C runtime with the calling convention and pointer
/// contracts of BSD's `execvP`. There is no such symbol in glibc to forward
/// to, so the resolution happens here in both the supervised and the
/// unsupervised case, and the execution goes through the real `execve`.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn execvP(
    file : *const c_char,
    search_path : *const c_char,
    argv : *const *const c_char,
) -> c_int {
    if file.is_null() || search_path.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let resolved = from_search_path(
        CStr::from_ptr(file),
        CStr::from_ptr(search_path).to_bytes(),
    );
    match resolved {
        Err(code) => {
            set_errno(code);
            -1
        }
        Ok(resolved) => {
            match SESSION.as_ref() {
                None => {
                    call_real_execve(*REAL_EXECVE, resolved.as_ptr(), argv, environ)
                }
                Some(session) => {
                    let command = SupervisedCommand::new(session, &resolved, argv);
                    call_real_execve(*REAL_EXECVE, command.file(), command.argv(), environ)
                }
            }
        }
    }
}

/// # Safety
///
/// Called by the C runtime with the calling convention and pointer
/// contracts of libc's `posix_spawn`.
#[no_mangle]
pub unsafe extern "C" fn posix_spawn(
    pid : *mut pid_t,
    path : *const c_char,
    file_actions : *const libc::posix_spawn_file_actions_t,
    attrp : *const libc::posix_spawnattr_t,
    argv : *const *const c_char,
    envp : *const *const c_char,
) -> c_int {
    let session = match SESSION.as_ref() {
        None => {
            return call_real_spawn(*REAL_POSIX_SPAWN, pid, path, file_actions, attrp, argv, envp);
        }
        Some(session) => { session }
    };
    if path.is_null() {
        return libc::EFAULT;
    }
    match from_current_directory(CStr::from_ptr(path)) {
        // posix_spawn reports failures in its return value, not in errno
        Err(code) => { code }
        Ok(resolved) => {
            let command = SupervisedCommand::new(session, &resolved, argv);
            call_real_spawn(*REAL_POSIX_SPAWN, pid, command.file(), file_actions, attrp, command.argv(), envp)
        }
    }
}

/// # Safety
///
/// Called by the C runtime with the calling convention and pointer
/// contracts of libc's `posix_spawnp`.
#[no_mangle]
pub unsafe extern "C" fn posix_spawnp(
    pid : *mut pid_t,
    file : *const c_char,
    file_actions : *const libc::posix_spawn_file_actions_t,
    attrp : *const libc::posix_spawnattr_t,
    argv : *const *const c_char,
    envp : *const *const c_char,
) -> c_int {
    let session = match SESSION.as_ref() {
        None => {
            return call_real_spawn(*REAL_POSIX_SPAWNP, pid, file, file_actions, attrp, argv, envp);
        }
        Some(session) => { session }
    };
    if file.is_null() {
        return libc::EFAULT;
    }
    match from_path(CStr::from_ptr(file), envp) {
        Err(code) => { code }
        Ok(resolved) => {
            let command = SupervisedCommand::new(session, &resolved, argv);
            call_real_spawn(*REAL_POSIX_SPAWN, pid, command.file(), file_actions, attrp, command.argv(), envp)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cstr(value : &str) -> CString {
        CString::new(value).unwrap()
    }

    #[test]
    fn env_value_lookup_works_on_c_vectors() {
        let entries = vec![
            cstr("HOME=/home/user"),
            cstr("PATH=/usr/bin:/bin"),
            cstr("PATHOLOGICAL=nope"),
        ];
        let mut pointers : Vec<*const c_char> = entries.iter().map(|it| it.as_ptr()).collect();
        pointers.push(std::ptr::null());

        let value = unsafe { get_env_value(pointers.as_ptr(), b"PATH") };
        assert_eq!(value, Some(b"/usr/bin:/bin".to_vec()));

        let value = unsafe { get_env_value(pointers.as_ptr(), b"MISSING") };
        assert_eq!(value, None);
    }

    #[test]
    fn search_path_finds_executables() {
        // `sh` exists in one of these on any sane test machine.
        let file = cstr("sh");
        let resolved = from_search_path(&file, b"/nonexistent::/usr/bin:/bin");
        assert!(resolved.is_ok());

        let missing = from_search_path(&cstr("no-such-program-here"), b"/usr/bin:/bin");
        assert_eq!(missing, Err(libc::ENOENT));
    }

    #[test]
    fn dir_separator_shortcuts_the_search() {
        let file = cstr("/bin/sh");
        let resolved = from_search_path(&file, b"/nonexistent");
        assert!(resolved.is_ok());
    }

    #[test]
    fn supervised_command_layout() {
        let session = Session {
            reporter : cstr("/usr/libexec/supervisor"),
            destination : cstr("127.0.0.1:12345"),
            verbose : false,
        };
        let argv = vec![cstr("cc"), cstr("-c"), cstr("hello.c")];
        let mut argv_pointers : Vec<*const c_char> = argv.iter().map(|it| it.as_ptr()).collect();
        argv_pointers.push(std::ptr::null());

        let command = unsafe {
            SupervisedCommand::new(&session, &cstr("/usr/bin/cc"), argv_pointers.as_ptr())
        };

        let rendered : Vec<String> = command._strings.iter()
            .map(|it| it.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "/usr/libexec/supervisor",
                "--session-destination",
                "127.0.0.1:12345",
                "--exec-path",
                "/usr/bin/cc",
                "--",
                "cc",
                "-c",
                "hello.c",
            ]
        );
        // the pointer vector is NULL terminated
        assert_eq!(command.pointers.len(), rendered.len() + 1);
        assert!(command.pointers.last().unwrap().is_null());
    }
}
