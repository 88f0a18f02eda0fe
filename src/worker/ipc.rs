//! Line-oriented IPC over pipes.
//!
//! Requests, responses and forwarded log records are all newline-delimited
//! JSON, so every channel between the parent and a worker is a pair of these.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Buffer size for IPC readers and writers (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// A pipe end that retries reads and writes interrupted by signals.
#[derive(Debug)]
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Take ownership of a raw file descriptor.
    ///
    /// # Safety
    /// `fd` must be open and not owned by anything else; it is closed on drop.
    pub unsafe fn from_raw(fd: RawFd) -> Self {
        Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        }
    }
}

impl From<std::process::ChildStdin> for PipeFd {
    fn from(stdin: std::process::ChildStdin) -> Self {
        Self::new(OwnedFd::from(stdin))
    }
}

impl From<std::process::ChildStdout> for PipeFd {
    fn from(stdout: std::process::ChildStdout) -> Self {
        Self::new(OwnedFd::from(stdout))
    }
}

impl From<std::process::ChildStderr> for PipeFd {
    fn from(stderr: std::process::ChildStderr) -> Self {
        Self::new(OwnedFd::from(stderr))
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Buffered line reader.
///
/// Invalid UTF-8 is replaced rather than rejected: worker stderr carries
/// whatever the target code prints, not only our own records.
#[derive(Debug)]
pub struct LineReader {
    reader: BufReader<PipeFd>,
    raw: Vec<u8>,
    line: String,
}

impl LineReader {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            reader: BufReader::with_capacity(BUFFER_SIZE, fd),
            raw: Vec::with_capacity(4096),
            line: String::with_capacity(4096),
        }
    }

    /// Read one line without its terminator. Returns `None` on EOF.
    pub fn read_line(&mut self) -> io::Result<Option<&str>> {
        self.raw.clear();
        if self.reader.read_until(b'\n', &mut self.raw)? == 0 {
            return Ok(None);
        }
        while matches!(self.raw.last(), Some(b'\n' | b'\r')) {
            self.raw.pop();
        }
        self.line.clear();
        self.line.push_str(&String::from_utf8_lossy(&self.raw));
        Ok(Some(&self.line))
    }

    /// Read and decode one JSON line.
    ///
    /// The outer `io::Result` reports transport failures, the inner one a line
    /// that is not a valid `T` (the raw line is handed back in that case).
    pub fn read_message<T: DeserializeOwned>(
        &mut self,
    ) -> io::Result<Option<Result<T, String>>> {
        match self.read_line()? {
            None => Ok(None),
            Some(line) => Ok(Some(
                serde_json::from_str(line.trim()).map_err(|_| line.to_string()),
            )),
        }
    }
}

/// Buffered line writer. Every write is flushed immediately.
#[derive(Debug)]
pub struct LineWriter {
    writer: BufWriter<PipeFd>,
}

impl LineWriter {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            writer: BufWriter::with_capacity(BUFFER_SIZE, fd),
        }
    }

    /// Write a line, appending the newline if missing.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }

    /// Serialize `message` as a single JSON line.
    pub fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let line = serde_json::to_string(message).map_err(io::Error::other)?;
        self.write_line(&line)
    }
}

/// Create an anonymous pipe, returning `(read_end, write_end)`.
pub fn pipe() -> io::Result<(PipeFd, PipeFd)> {
    let (read_fd, write_fd) =
        nix::unistd::pipe().map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    Ok((PipeFd::new(read_fd), PipeFd::new(write_fd)))
}
