use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::container::Pid;
use crate::fsutil::{self, FileOpenError};
use crate::stats::{NetworkCounters, parse_net_dev};

/// Open handle on a container process' `net/dev` file.
///
/// The file stays open for the lifetime of the handle and is closed when the
/// handle is dropped. Its path doubles as the liveness probe of the process.
#[derive(Debug)]
pub struct ProcessHandle {
    path: PathBuf,
    reader: BufReader<File>,
}

impl ProcessHandle {
    /// Opens `<proc_root>/<pid>/net/dev`.
    ///
    /// # Errors
    ///
    /// Returns a [`FileOpenError`]; [`FileOpenError::is_not_found`] tells that
    /// the process no longer exists.
    pub fn open(proc_root: &Path, pid: Pid) -> Result<Self, FileOpenError> {
        let path = fsutil::net_dev_path(proc_root, pid);
        let reader = fsutil::open_file_reader(&path)?;
        Ok(Self { path, reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` while the process is still around.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the current per-interface counters from the start of the file.
    ///
    /// # Errors
    ///
    /// Fails with kind `InvalidData` if the table is malformed; a later call
    /// reads the table afresh.
    pub fn read_interfaces(&mut self) -> std::io::Result<BTreeMap<String, NetworkCounters>> {
        self.reader.seek(SeekFrom::Start(0))?;
        parse_net_dev(&mut self.reader)
    }
}
