//! File access abstraction.
//!
//! The sender reads from a file it opens by name, the receiver creates the
//! file the peer announced. Both go through [`FileIo`] so the core works
//! the same against `std::fs`, a flash filesystem, or an in-memory store
//! in tests. Short reads and writes signal errors; the core never sees an
//! `io::Error` directly.

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

/// File operations needed by a transfer.
///
/// `Handle` is whatever the implementation uses to track an open file.
/// The [`Context`](crate::context::Context) owns the handle exclusively
/// for the duration of a transfer and always hands it back to [`close`]
/// on exit.
///
/// [`close`]: FileIo::close
pub trait FileIo {
    /// An open file.
    type Handle;

    /// Opens `name` for reading, or for writing (create/truncate) when
    /// `writing` is true. `None` means the open failed.
    fn open(&mut self, name: &str, writing: bool) -> Option<Self::Handle>;

    /// Reads up to `buf.len()` bytes. 0 means end of file or error.
    fn read(&mut self, handle: &mut Self::Handle, buf: &mut [u8]) -> usize;

    /// Writes `data`, returning how many bytes landed. Anything short of
    /// `data.len()` is treated as a failed write by the protocol.
    fn write(&mut self, handle: &mut Self::Handle, data: &[u8]) -> usize;

    /// Total size of the file. Consulted once, right after open; end of
    /// file during the transfer is a 0 return from [`read`](FileIo::read).
    fn size(&mut self, handle: &mut Self::Handle) -> Option<u64>;

    /// Releases the handle.
    fn close(&mut self, handle: Self::Handle);
}

/// [`FileIo`] over the host filesystem.
///
/// By default names resolve relative to the current directory; a rooted
/// instance resolves them under a fixed directory instead, which is what a
/// receiver wants when the peer announces bare filenames.
#[derive(Debug, Default, Clone)]
pub struct StdFs {
    root: Option<PathBuf>,
}

impl StdFs {
    /// Filesystem access relative to the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filesystem access with every name resolved under `dir`.
    pub fn rooted(dir: impl Into<PathBuf>) -> Self {
        Self { root: Some(dir.into()) }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(name),
            None => PathBuf::from(name),
        }
    }
}

impl FileIo for StdFs {
    type Handle = File;

    fn open(&mut self, name: &str, writing: bool) -> Option<File> {
        let path = self.resolve(name);
        let res = if writing { File::create(&path) } else { File::open(&path) };
        match res {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("open {name:?} (writing: {writing}) failed: {e}");
                None
            }
        }
    }

    fn read(&mut self, handle: &mut File, buf: &mut [u8]) -> usize {
        handle.read(buf).unwrap_or(0)
    }

    fn write(&mut self, handle: &mut File, data: &[u8]) -> usize {
        match handle.write_all(data) {
            Ok(()) => data.len(),
            Err(e) => {
                warn!("file write failed: {e}");
                0
            }
        }
    }

    fn size(&mut self, handle: &mut File) -> Option<u64> {
        handle.metadata().ok().map(|m| m.len())
    }

    fn close(&mut self, handle: File) {
        drop(handle);
    }
}

/// In-memory [`FileIo`] used by the state machine tests.
///
/// Tracks how many handles are outstanding so tests can assert that every
/// exit path released the file.
#[cfg(test)]
pub(crate) struct MemFs {
    pub files: std::collections::HashMap<String, Vec<u8>>,
    pub open_handles: usize,
    pub fail_open: bool,
}

#[cfg(test)]
pub(crate) struct MemHandle {
    name: String,
    data: Vec<u8>,
    pos: usize,
    writing: bool,
}

#[cfg(test)]
impl MemFs {
    pub fn new() -> Self {
        Self {
            files: std::collections::HashMap::new(),
            open_handles: 0,
            fail_open: false,
        }
    }

    pub fn with_file(name: &str, data: &[u8]) -> Self {
        let mut fs = Self::new();
        fs.files.insert(name.to_string(), data.to_vec());
        fs
    }
}

#[cfg(test)]
impl FileIo for MemFs {
    type Handle = MemHandle;

    fn open(&mut self, name: &str, writing: bool) -> Option<MemHandle> {
        if self.fail_open {
            return None;
        }
        let data = if writing {
            Vec::new()
        } else {
            self.files.get(name)?.clone()
        };
        self.open_handles += 1;
        Some(MemHandle { name: name.to_string(), data, pos: 0, writing })
    }

    fn read(&mut self, handle: &mut MemHandle, buf: &mut [u8]) -> usize {
        let n = buf.len().min(handle.data.len() - handle.pos);
        buf[..n].copy_from_slice(&handle.data[handle.pos..handle.pos + n]);
        handle.pos += n;
        n
    }

    fn write(&mut self, handle: &mut MemHandle, data: &[u8]) -> usize {
        handle.data.extend_from_slice(data);
        data.len()
    }

    fn size(&mut self, handle: &mut MemHandle) -> Option<u64> {
        Some(handle.data.len() as u64)
    }

    fn close(&mut self, handle: MemHandle) {
        self.open_handles -= 1;
        if handle.writing {
            self.files.insert(handle.name, handle.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_fs_round_trip() {
        let dir = std::env::temp_dir().join("ymodem_std_fs_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("blob.bin");
        let path = path.to_str().unwrap();

        let mut fs = StdFs::new();
        let mut h = fs.open(path, true).unwrap();
        assert_eq!(fs.write(&mut h, b"hello"), 5);
        fs.close(h);

        let mut h = fs.open(path, false).unwrap();
        assert_eq!(fs.size(&mut h), Some(5));
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(&mut h, &mut buf), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(fs.read(&mut h, &mut buf), 0);
        fs.close(h);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn open_missing_file_is_none() {
        let mut fs = StdFs::new();
        assert!(fs.open("/nonexistent/ymodem/nope.bin", false).is_none());
    }

    #[test]
    fn rooted_resolution() {
        let dir = std::env::temp_dir().join("ymodem_rooted_test");
        std::fs::create_dir_all(&dir).unwrap();

        let mut fs = StdFs::rooted(&dir);
        let mut h = fs.open("out.bin", true).unwrap();
        assert_eq!(fs.write(&mut h, b"xy"), 2);
        fs.close(h);

        assert_eq!(std::fs::read(dir.join("out.bin")).unwrap(), b"xy");
        std::fs::remove_file(dir.join("out.bin")).ok();
    }
}
