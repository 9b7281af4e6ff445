use std::path::{Path, PathBuf};

pub const TMP_DIR: &str = "/tmp";

/// Base file name of `script_path`, directories stripped.
pub fn my_name(script_path: impl AsRef<Path>) -> String {
    let path = script_path.as_ref();
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}

/// `/tmp/<script name without extension>.log`
pub fn log_filename(script_path: impl AsRef<Path>) -> PathBuf {
    log_filename_in(TMP_DIR, script_path)
}

pub fn log_filename_in(dir: impl AsRef<Path>, script_path: impl AsRef<Path>) -> PathBuf {
    let name = Path::new(&my_name(script_path)).with_extension("log");
    dir.as_ref().join(name)
}

/// Path the running program was started as.
pub fn current_script() -> PathBuf {
    std::env::args_os()
        .next()
        .map(PathBuf::from)
        .or_else(|| std::env::current_exe().ok())
        .unwrap_or_default()
}
