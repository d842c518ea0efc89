//! Named pipes between the coordinator and one worker
//!
//! Opening a FIFO blocks until the other end is opened too. The coordinator
//! must not hang if the worker dies before opening its end, so the blocking
//! open runs on a helper thread while the caller polls the child's exit
//! status. If the child is gone, the FIFO is opened read-write without
//! blocking, which releases the helper's pending open.

use crate::error::{ExecutorError, ExecutorResult};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How often a pending rendezvous checks on the child
const RENDEZVOUS_TICK: Duration = Duration::from_millis(50);

/// Which end of a FIFO to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Direction::Read => options.read(true),
            Direction::Write => options.write(true),
        };
        options
    }
}

/// Create a FIFO at `path`, replacing any stale file
pub fn make_fifo(path: &Path) -> ExecutorResult<()> {
    let create_err = |source| ExecutorError::FifoCreate {
        path: path.to_path_buf(),
        source,
    };

    if fs::symlink_metadata(path).is_ok() {
        fs::remove_file(path).map_err(create_err)?;
    }

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| create_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    let ret = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if ret != 0 {
        return Err(create_err(io::Error::last_os_error()));
    }
    Ok(())
}

/// Request and answer FIFOs for one worker slot
///
/// Both files are removed when the pair is dropped.
#[derive(Debug)]
pub struct FifoPair {
    pub request: PathBuf,
    pub answer: PathBuf,
}

impl FifoPair {
    /// Create `<dir>/<tag>_req<index>` and `<dir>/<tag>_ans<index>`
    pub fn create(dir: &Path, tag: &str, index: usize) -> ExecutorResult<Self> {
        let pair = Self {
            request: dir.join(format!("{}_req{}", tag, index)),
            answer: dir.join(format!("{}_ans{}", tag, index)),
        };
        make_fifo(&pair.request)?;
        make_fifo(&pair.answer)?;
        trace!(request = %pair.request.display(), answer = %pair.answer.display(), "Created FIFOs");
        Ok(pair)
    }
}

impl Drop for FifoPair {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.request);
        let _ = fs::remove_file(&self.answer);
    }
}

/// Open our end of a FIFO, giving up if `child` exits first
pub fn rendezvous(
    path: &Path,
    direction: Direction,
    index: usize,
    child: &mut Child,
) -> ExecutorResult<File> {
    let (tx, rx) = bounded(1);
    let target = path.to_path_buf();
    thread::Builder::new()
        .name(format!("fifo-open-{}", index))
        .spawn(move || {
            let _ = tx.send(direction.options().open(&target));
        })?;

    loop {
        match rx.recv_timeout(RENDEZVOUS_TICK) {
            Ok(Ok(file)) => return Ok(file),
            Ok(Err(e)) => {
                return Err(ExecutorError::FifoOpen {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some(status) = child.try_wait()? {
                    debug!(worker = index, %status, "Worker exited before rendezvous");
                    release_pending_open(path);
                    let _ = rx.recv_timeout(Duration::from_secs(1));
                    return Err(ExecutorError::WorkerExited { index, status });
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ExecutorError::FifoOpen {
                    path: path.to_path_buf(),
                    source: io::Error::other("open thread vanished"),
                })
            }
        }
    }
}

/// Unblock a thread stuck opening `path`
fn release_pending_open(path: &Path) {
    let _ = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path);
}

/// Switch a descriptor to non-blocking mode
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Discard whatever is buffered in a pipe without blocking
pub fn drain_nonblocking(file: &mut File) -> usize {
    use std::io::Read;

    if set_nonblocking(file.as_raw_fd()).is_err() {
        return 0;
    }
    let mut buf = [0u8; 4096];
    let mut drained = 0;
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => drained += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    drained
}

/// Wait until any of `fds` is readable or hung up
///
/// Returns the indexes (into `fds`) that are ready; empty on timeout.
/// `EINTR` counts as a timeout so callers can re-check their flags.
pub fn poll_readable(fds: &[RawFd], timeout: Duration) -> io::Result<Vec<usize>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
    let ret = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Vec::new());
        }
        return Err(err);
    }

    Ok(pollfds
        .iter()
        .enumerate()
        .filter(|(_, p)| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
        .map(|(i, _)| i)
        .collect())
}

/// Wait for one descriptor until `deadline`; false on timeout
pub fn wait_readable(fd: RawFd, deadline: Instant) -> io::Result<bool> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        if !poll_readable(&[fd], remaining)?.is_empty() {
            return Ok(true);
        }
    }
}

/// Reader that fails with `TimedOut` once `deadline` passes
///
/// Every read waits for readiness first, so a peer that stops part way
/// through a record cannot hold the caller past the deadline.
pub struct DeadlineReader<'a> {
    file: &'a mut File,
    deadline: Instant,
}

impl<'a> DeadlineReader<'a> {
    pub fn new(file: &'a mut File, deadline: Instant) -> Self {
        Self { file, deadline }
    }
}

impl io::Read for DeadlineReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !wait_readable(self.file.as_raw_fd(), self.deadline)? {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read deadline passed"));
        }
        io::Read::read(&mut *self.file, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::process::Command;
    use tempfile::tempdir;

    #[test]
    fn test_fifo_pair_lifecycle() {
        let dir = tempdir().unwrap();
        let (request, answer) = {
            let pair = FifoPair::create(dir.path(), "t", 0).unwrap();
            let meta = fs::metadata(&pair.request).unwrap();
            use std::os::unix::fs::FileTypeExt;
            assert!(meta.file_type().is_fifo());
            (pair.request.clone(), pair.answer.clone())
        };
        assert!(!request.exists());
        assert!(!answer.exists());
    }

    #[test]
    fn test_rendezvous_with_writer() {
        let dir = tempdir().unwrap();
        let pair = FifoPair::create(dir.path(), "t", 1).unwrap();
        let path = pair.request.clone();

        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let writer = thread::spawn(move || {
            let mut f = OpenOptions::new().write(true).open(&path).unwrap();
            f.write_all(b"hello").unwrap();
        });

        let mut file = rendezvous(&pair.request, Direction::Read, 1, &mut child).unwrap();
        let mut got = String::new();
        file.read_to_string(&mut got).unwrap();
        writer.join().unwrap();
        assert_eq!(got, "hello");

        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    fn test_rendezvous_gives_up_when_child_exits() {
        let dir = tempdir().unwrap();
        let pair = FifoPair::create(dir.path(), "t", 2).unwrap();
        let mut child = Command::new("true").spawn().unwrap();

        let err = rendezvous(&pair.answer, Direction::Read, 2, &mut child).unwrap_err();
        assert!(matches!(err, ExecutorError::WorkerExited { index: 2, .. }));
    }

    #[test]
    fn test_poll_timeout_and_ready() {
        let dir = tempdir().unwrap();
        let pair = FifoPair::create(dir.path(), "t", 3).unwrap();
        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&pair.request)
            .unwrap();
        let mut writer = OpenOptions::new().write(true).open(&pair.request).unwrap();

        let fd = reader.as_raw_fd();
        assert!(poll_readable(&[fd], Duration::from_millis(20)).unwrap().is_empty());
        writer.write_all(b"x").unwrap();
        assert_eq!(poll_readable(&[fd], Duration::from_secs(1)).unwrap(), vec![0]);

        let mut reader = reader;
        assert_eq!(drain_nonblocking(&mut reader), 1);
    }

    #[test]
    fn test_deadline_reader_gives_up_mid_record() {
        let dir = tempdir().unwrap();
        let pair = FifoPair::create(dir.path(), "t", 4).unwrap();
        let mut reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&pair.answer)
            .unwrap();
        let mut writer = OpenOptions::new().write(true).open(&pair.answer).unwrap();

        // half a header, then silence with the writer still open
        writer.write_all(&[4, 0, 0, 0]).unwrap();

        let started = Instant::now();
        let mut timed = DeadlineReader::new(&mut reader, started + Duration::from_millis(200));
        let mut header = [0u8; 8];
        let err = timed.read_exact(&mut header).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_deadline_reader_passes_complete_data() {
        let dir = tempdir().unwrap();
        let pair = FifoPair::create(dir.path(), "t", 5).unwrap();
        let mut reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&pair.answer)
            .unwrap();
        let mut writer = OpenOptions::new().write(true).open(&pair.answer).unwrap();
        writer.write_all(b"12345678").unwrap();

        let mut timed = DeadlineReader::new(&mut reader, Instant::now() + Duration::from_secs(5));
        let mut buf = [0u8; 8];
        timed.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"12345678");
    }
}
