use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A writer that can be handed to several invocations at once.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// A reader that can be handed to an invocation without giving up ownership.
pub type SharedReader = Arc<Mutex<dyn Read + Send>>;

const CHUNK: usize = 8 * 1024;

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where a child process reads its standard input from.
///
/// An unset input in [`crate::ExecOptions`] means the child inherits the
/// parent's stdin.
#[derive(Clone)]
pub enum Input {
    /// Read from the null device.
    Null,
    /// Relay bytes from a reader into the child's stdin pipe.
    Reader(SharedReader),
}

impl Input {
    /// Relay `r` into the child's stdin.
    ///
    /// The relay thread is detached if it is still blocked in `read` when the
    /// child finishes, so a reader that never reaches EOF (the process's own
    /// stdin, a socket) keeps one thread alive per invocation until it does.
    pub fn reader(r: impl Read + Send + 'static) -> Self {
        Input::Reader(Arc::new(Mutex::new(r)))
    }

    /// Feed the given bytes to the child, then close its stdin.
    pub fn bytes(buf: impl Into<Vec<u8>>) -> Self {
        Self::reader(MemReader::new(buf.into()))
    }

    pub(crate) fn stdio(input: Option<&Input>) -> Stdio {
        match input {
            None => Stdio::inherit(),
            Some(Input::Null) => Stdio::null(),
            Some(Input::Reader(_)) => Stdio::piped(),
        }
    }

    /// Copy everything from this input into `sink`, one chunk per lock.
    ///
    /// A child that exits without draining its stdin is not an error.
    pub(crate) fn relay_into(&self, mut sink: impl Write) -> io::Result<()> {
        let Input::Reader(reader) = self else {
            return Ok(());
        };
        let mut buf = [0u8; CHUNK];
        loop {
            let n = match lock(reader).read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            match sink.write_all(&buf[..n]) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

impl PartialEq for Input {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Input::Null, Input::Null) => true,
            (Input::Reader(a), Input::Reader(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Null => f.write_str("Null"),
            Input::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Where a child process writes its standard output or standard error.
///
/// An unset output in [`crate::ExecOptions`] means the child inherits the
/// parent's stream.
#[derive(Clone)]
pub enum Output {
    /// Discard everything.
    Null,
    /// Relay bytes from the child's pipe into a shared writer.
    Writer(SharedWriter),
}

impl Output {
    pub fn writer(w: impl Write + Send + 'static) -> Self {
        Output::Writer(Arc::new(Mutex::new(w)))
    }

    pub fn stdout() -> Self {
        Self::writer(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::writer(io::stderr())
    }

    pub(crate) fn stdio(output: Option<&Output>) -> Stdio {
        match output {
            None => Stdio::inherit(),
            Some(Output::Null) => Stdio::null(),
            Some(Output::Writer(_)) => Stdio::piped(),
        }
    }

    /// Write one chunk while holding the writer's lock.
    pub fn write_chunk(&self, data: &[u8]) -> io::Result<()> {
        match self {
            Output::Null => Ok(()),
            Output::Writer(w) => lock(w).write_all(data),
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        match self {
            Output::Null => Ok(()),
            Output::Writer(w) => lock(w).flush(),
        }
    }

    /// Copy everything from `source` into this output, one chunk per lock, so
    /// that stdout and stderr of one or more children can share a writer.
    pub(crate) fn relay_from(&self, mut source: impl Read) -> io::Result<()> {
        let mut buf = [0u8; CHUNK];
        loop {
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.write_chunk(&buf[..n])?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.flush()
    }
}

impl PartialEq for Output {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Output::Null, Output::Null) => true,
            (Output::Writer(a), Output::Writer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Null => f.write_str("Null"),
            Output::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Memory-backed reader.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(out)
    }
}

/// Memory-backed writer for capturing output of commands.
///
/// Clones share the same buffer, so a clone can be handed to a command while
/// the caller keeps one to read the collected bytes afterwards.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.buf).clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buf)).into_owned()
    }

    /// An [`Output`] that writes into this buffer.
    pub fn output(&self) -> Output {
        Output::writer(self.clone())
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        lock(&self.buf).extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
