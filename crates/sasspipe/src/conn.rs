use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Error, Result};

/// How long `close` waits for the compiler to exit after EOF on its stdin.
/// The compiler quits on its own when stdin closes; this just gives it time.
const EXIT_WAIT: Duration = Duration::from_secs(1);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long a reader poll sleeps before re-checking the close flag.
const READER_POLL_INTERVAL_MS: i32 = 50;

/// Bytes of child stderr retained for exit classification.
const STDERR_TAIL_LIMIT: usize = 1024;

/// Owns the compiler process, the handle that closes the reader half, the
/// stderr tail, and the pump thread feeding it. The stdin and stdout halves
/// are handed to the transpiler at spawn time; this struct keeps what
/// `close` needs.
pub(crate) struct Connection {
    child: Child,
    reader: ReaderHandle,
    stderr_tail: Arc<Mutex<TailBuffer>>,
    stderr_pump: Option<JoinHandle<()>>,
}

/// Read half of the child's stdout. A blocked pipe read cannot be
/// interrupted from another thread, so reads poll the descriptor with a
/// short timeout and check the close flag in between; closing the
/// [`ReaderHandle`] makes the next check report end of stream.
pub(crate) struct StdoutReader {
    inner: ChildStdout,
    closed: Arc<AtomicBool>,
}

impl StdoutReader {
    fn new(inner: ChildStdout) -> (Self, ReaderHandle) {
        let closed = Arc::new(AtomicBool::new(false));
        let handle = ReaderHandle {
            closed: Arc::clone(&closed),
        };
        (Self { inner, closed }, handle)
    }
}

impl Read for StdoutReader {
    #[cfg(unix)]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::os::fd::AsRawFd;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            let mut fds = libc::pollfd {
                fd: self.inner.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            // SAFETY: `fds` is a valid pollfd for the duration of the call
            // and the descriptor is owned by `inner`, which outlives it.
            let ready = unsafe { libc::poll(&mut fds, 1, READER_POLL_INTERVAL_MS) };
            match ready {
                -1 => {
                    let err = std::io::Error::last_os_error();
                    if err.kind() == ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err);
                }
                0 => continue,
                _ => return self.inner.read(buf),
            }
        }
    }

    #[cfg(not(unix))]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(0);
        }
        self.inner.read(buf)
    }
}

/// Closes the reader half: flips the flag the polling reader observes, so a
/// blocked reader unblocks within one poll interval.
pub(crate) struct ReaderHandle {
    closed: Arc<AtomicBool>,
}

impl ReaderHandle {
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Spawn the compiler with piped stdio. Returns the connection plus the
/// writer half (stdin) and a buffered reader half (stdout), buffered so the
/// varint decoder's single-byte reads stay cheap.
pub(crate) fn spawn(
    bin: &Path,
    stderr_sink: Option<Box<dyn Write + Send>>,
) -> Result<(Connection, ChildStdin, std::io::BufReader<StdoutReader>)> {
    debug!(bin = %bin.display(), "spawning compiler");
    let mut child = Command::new(bin)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdin = take_pipe(child.stdin.take(), "stdin")?;
    let stdout = take_pipe(child.stdout.take(), "stdout")?;
    let stderr = take_pipe(child.stderr.take(), "stderr")?;
    let (reader, reader_handle) = StdoutReader::new(stdout);

    let stderr_tail = Arc::new(Mutex::new(TailBuffer::with_limit(STDERR_TAIL_LIMIT)));
    let pump_tail = Arc::clone(&stderr_tail);
    let stderr_pump = thread::Builder::new()
        .name("sasspipe-stderr".to_string())
        .spawn(move || pump_stderr(stderr, pump_tail, stderr_sink))?;

    Ok((
        Connection {
            child,
            reader: reader_handle,
            stderr_tail,
            stderr_pump: Some(stderr_pump),
        },
        stdin,
        std::io::BufReader::new(reader),
    ))
}

fn take_pipe<T>(pipe: Option<T>, name: &str) -> Result<T> {
    pipe.ok_or_else(|| Error::from(std::io::Error::other(format!("child {name} not captured"))))
}

impl Connection {
    /// Close the reader half, then wait for the child to exit, bounded by
    /// [`EXIT_WAIT`]. The caller has already closed the child's stdin.
    /// Closing the reader guarantees the reader loop unblocks and drains
    /// within one poll interval even if the child ignores EOF.
    pub(crate) fn close(mut self) -> Result<()> {
        self.reader.close();
        let result = self.wait_with_timeout();
        // The pump ends when the child's stderr closes; a child that
        // outlived the wait still holds it open, so only join after an
        // observed exit.
        if !matches!(result, Err(Error::WaitTimeout)) {
            if let Some(pump) = self.stderr_pump.take() {
                let _ = pump.join();
            }
        }
        result
    }

    fn wait_with_timeout(&mut self) -> Result<()> {
        let deadline = Instant::now() + EXIT_WAIT;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "compiler exited");
                    if status.success() {
                        return Ok(());
                    }
                    // A nonzero status caused by our own EOF-initiated
                    // shutdown shows up as a broken-pipe complaint on stderr.
                    let tail = self.stderr_tail.lock().unwrap().contents();
                    if is_broken_pipe(&tail) {
                        return Ok(());
                    }
                    return Err(Error::CompilerExit(format!("{status}: {}", tail.trim())));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return Err(Error::WaitTimeout);
                    }
                    thread::sleep(EXIT_POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn pump_stderr(
    mut stderr: ChildStderr,
    tail: Arc<Mutex<TailBuffer>>,
    mut sink: Option<Box<dyn Write + Send>>,
) {
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                tail.lock().unwrap().push(&buf[..n]);
                if let Some(sink) = sink.as_mut() {
                    let _ = sink.write_all(&buf[..n]);
                    let _ = sink.flush();
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return,
        }
    }
}

fn is_broken_pipe(stderr_tail: &str) -> bool {
    stderr_tail.contains("Broken pipe") || stderr_tail.contains("pipe is being closed")
}

/// Bounded buffer keeping the most recent bytes written to it; the oldest
/// bytes are dropped on overflow.
pub(crate) struct TailBuffer {
    limit: usize,
    data: VecDeque<u8>,
}

impl TailBuffer {
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            data: VecDeque::with_capacity(limit.min(4096)),
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        if bytes.len() >= self.limit {
            self.data.clear();
            self.data.extend(&bytes[bytes.len() - self.limit..]);
            return;
        }
        let overflow = (self.data.len() + bytes.len()).saturating_sub(self.limit);
        self.data.drain(..overflow);
        self.data.extend(bytes);
    }

    pub(crate) fn contents(&self) -> String {
        let (front, back) = self.data.as_slices();
        let mut contents = String::from_utf8_lossy(front).into_owned();
        contents.push_str(&String::from_utf8_lossy(back));
        contents
    }
}

/// Resolve an executable name the way a safe `$PATH` walk does: a bare name
/// is searched in absolute `$PATH` entries only, so a match never resolves
/// against the current directory. Names containing a separator are used
/// as-is.
pub(crate) fn look_path(name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return if is_executable(candidate) {
            Ok(candidate.to_path_buf())
        } else {
            Err(Error::ExecutableNotFound(name.to_string()))
        };
    }
    let path = std::env::var_os("PATH").unwrap_or_default();
    search_dirs(name, std::env::split_paths(&path))
        .ok_or_else(|| Error::ExecutableNotFound(name.to_string()))
}

fn search_dirs(name: &str, dirs: impl Iterator<Item = PathBuf>) -> Option<PathBuf> {
    for dir in dirs {
        if dir.as_os_str().is_empty() || dir.is_relative() {
            continue;
        }
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
