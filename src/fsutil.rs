//! Small helpers for reading files below `/proc`, `/sys/fs/cgroup` and the
//! host root.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::container::Pid;

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FileOpenError {
    /// Returns `true` if the file does not exist, e.g. because the process
    /// owning a `/proc` entry exited.
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use creo_metrics::fsutil;
/// let reader = fsutil::open_file_reader("/sys/fs/cgroup/cpu.stat")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| FileOpenError {
            path: path.to_path_buf(),
            source,
        })
}

/// Path of the `net/dev` table of `pid` below `proc_root`.
pub fn net_dev_path(proc_root: &Path, pid: Pid) -> PathBuf {
    proc_root.join(pid.to_string()).join("net").join("dev")
}

/// Reads a whole file and trims surrounding whitespace, e.g. `/etc/hostname`.
pub fn read_trimmed(path: impl AsRef<Path>) -> io::Result<String> {
    let mut reader = open_file_reader(path).map_err(|err| io::Error::new(err.source.kind(), err))?;
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    Ok(content.trim().to_owned())
}
