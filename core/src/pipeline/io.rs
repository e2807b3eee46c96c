//! Carrier sources, pipe pumps and an in-process byte pipe.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, Sender};

use crate::pipeline::supervisor::CancelFlag;
use crate::ports::{BlobError, BlobStore};
use crate::types::BlobHandle;

type OpenFn = dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync;

/// Re-openable carrier. Encoding reads the carrier twice (probe, then
/// decode), so a one-shot reader is not enough.
#[derive(Clone)]
pub enum InputSource {
    File(PathBuf),
    Memory(Bytes),
    Opener(Arc<OpenFn>),
}

impl InputSource {
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            InputSource::File(path) => Ok(Box::new(File::open(path)?)),
            InputSource::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            InputSource::Opener(open) => open(),
        }
    }

    /// Lazily resolved blob; every `open` is a fresh `get`.
    pub fn from_blob(store: Arc<dyn BlobStore>, handle: BlobHandle) -> Self {
        InputSource::Opener(Arc::new(move || {
            store.get(&handle).map_err(|e| match e {
                BlobError::Io(inner) => inner,
                BlobError::NotFound(h) => io::Error::new(io::ErrorKind::NotFound, format!("blob {h} not found")),
                other => io::Error::new(io::ErrorKind::Other, other.to_string()),
            })
        }))
    }
}

impl From<Vec<u8>> for InputSource {
    fn from(bytes: Vec<u8>) -> Self {
        InputSource::Memory(Bytes::from(bytes))
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::File(path) => f.debug_tuple("File").field(path).finish(),
            InputSource::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
            InputSource::Opener(_) => f.write_str("Opener(..)"),
        }
    }
}

/// Fill `buf` unless EOF comes first. Returns the number of bytes read; a
/// value below `buf.len()` means the stream is exhausted.
pub fn read_frame<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut off = 0;
    while off < buf.len() {
        match r.read(&mut buf[off..]) {
            Ok(0) => break,
            Ok(n) => off += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(off)
}

/// Copy until EOF in `chunk`-sized pieces, giving up once `cancel` is set.
pub fn pump<R, W>(reader: &mut R, writer: &mut W, chunk: usize, cancel: &CancelFlag) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; chunk.max(1)];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "pipeline cancelled"));
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

enum Piece {
    Data(Bytes),
    End,
}

/// Writing half of [`byte_channel`].
pub struct ChannelWriter {
    tx: Sender<Piece>,
    finished: bool,
}

/// Reading half of [`byte_channel`]. A writer dropped without
/// [`ChannelWriter::finish`] shows up as `UnexpectedEof`, never as a clean end.
pub struct ChannelReader {
    rx: Receiver<Piece>,
    current: Bytes,
    done: bool,
}

/// Bounded in-process pipe for handing a producer's output to a consumer
/// that wants a `Read` (e.g. a blob store `put`) without buffering it all.
pub fn byte_channel(depth: usize) -> (ChannelWriter, ChannelReader) {
    let (tx, rx) = bounded(depth.max(1));
    (
        ChannelWriter { tx, finished: false },
        ChannelReader { rx, current: Bytes::new(), done: false },
    )
}

impl ChannelWriter {
    /// Mark a clean end of stream.
    pub fn finish(mut self) -> io::Result<()> {
        self.finished = true;
        self.tx
            .send(Piece::End)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "byte channel reader gone"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Piece::Data(Bytes::copy_from_slice(data)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "byte channel reader gone"))?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelWriter").field("finished", &self.finished).finish()
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            if self.done {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Piece::Data(bytes)) => self.current = bytes,
                Ok(Piece::End) => self.done = true,
                Err(_) => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "byte channel writer aborted"));
                }
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        Ok(n)
    }
}
