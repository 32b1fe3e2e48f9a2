//! Streaming content transfer to and from a device
//!
//! Reads produce a lazy sequence of bounded chunks ([`ChunkReader`]), so a
//! caller can show progress and stop at any point without the whole file in
//! memory. Writes consume any chunk sequence and stream it onto the device
//! the same way.
//!
//! Cancellation is cooperative: a [`CancelToken`] is consulted between
//! chunks, never interrupting an in-flight native call. A cancelled write
//! ABORTS the upload — the partially written object is removed from the
//! device, not left truncated — and reports
//! [`AccessError::Cancelled`] with the byte count reached. Any other
//! mid-transfer failure is reported as [`AccessError::TransferInterrupted`]
//! with the bytes transferred so far; a device disconnect keeps its own
//! error kind so callers can tell the two apart.

use log::{debug, warn};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::{AccessError, Result};
use crate::device::object::{ObjectId, ObjectInfo};
use crate::device::traits::DeviceSession;

/// Default chunk size for streamed transfers. 256 KiB is the optimal
/// transfer size most WPD devices report.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Cooperative cancellation flag, shared between a caller (e.g. a GUI
/// thread or a Ctrl-C handler) and a running walk or transfer
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; checked between chunks and walk steps
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tuning for one transfer
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Upper bound for each chunk in bytes
    pub chunk_size: usize,
    /// Cancellation flag consulted between chunks
    pub cancel: CancelToken,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancelToken::new(),
        }
    }
}

impl TransferOptions {
    /// Options with a specific chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            ..Self::default()
        }
    }

    /// Attach a cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Lazy sequence of byte chunks read from one device object
pub struct ChunkReader<'a> {
    reader: Box<dyn Read + 'a>,
    chunk_size: usize,
    cancel: CancelToken,
    bytes_transferred: u64,
    done: bool,
}

impl ChunkReader<'_> {
    /// Bytes yielded so far
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }
}

impl Iterator for ChunkReader<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Some(Err(AccessError::Cancelled {
                bytes_transferred: self.bytes_transferred,
            }));
        }

        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0usize;
        while filled < chunk.len() {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    if e.kind() == std::io::ErrorKind::NotConnected {
                        return Some(Err(AccessError::DeviceDisconnected));
                    }
                    return Some(Err(AccessError::TransferInterrupted {
                        bytes_transferred: self.bytes_transferred,
                        message: e.to_string(),
                    }));
                }
            }
        }

        if filled == 0 {
            self.done = true;
            return None;
        }
        chunk.truncate(filled);
        self.bytes_transferred += filled as u64;
        Some(Ok(chunk))
    }
}

/// Open a lazy chunked read of one file object
pub fn read<'a>(
    session: &'a dyn DeviceSession,
    object: &ObjectInfo,
    options: &TransferOptions,
) -> Result<ChunkReader<'a>> {
    if !object.is_file() {
        return Err(AccessError::Backend(format!(
            "'{}' is not a file",
            object.name
        )));
    }
    let reader = session.open_read(&object.id)?;
    debug!("Reading '{}' ({} bytes expected)", object.name, object.size);
    Ok(ChunkReader {
        reader,
        chunk_size: options.chunk_size.max(1),
        cancel: options.cancel.clone(),
        bytes_transferred: 0,
        done: false,
    })
}

/// Stream a chunk sequence into a file object under `parent`, replacing
/// any existing object of the same name.
///
/// `size_hint` is passed to the backend when the total length is known (the
/// WPD backend forwards it as the object size property). `progress` is
/// invoked with the cumulative byte count after every chunk.
///
/// On cancellation the partial object is removed from the device and
/// `Cancelled` is returned; on any other failure the partial object is
/// likewise discarded and `TransferInterrupted` (or `DeviceDisconnected`)
/// is returned.
pub fn write<'a, I>(
    session: &'a dyn DeviceSession,
    parent: &ObjectId,
    name: &str,
    chunks: I,
    size_hint: Option<u64>,
    options: &TransferOptions,
    mut progress: impl FnMut(u64),
) -> Result<ObjectInfo>
where
    I: IntoIterator<Item = Result<Vec<u8>>>,
{
    // MTP devices do not overwrite on a name collision; an upload onto an
    // existing name replaces the old object explicitly.
    if let Some(existing) = session
        .list_children(parent)?
        .into_iter()
        .find(|child| child.name == name)
    {
        debug!("Replacing existing object '{}'", name);
        match session.delete_object(&existing.id) {
            Ok(()) | Err(AccessError::ObjectNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let mut writer = session.create_file(parent, name, size_hint)?;
    let mut bytes_transferred = 0u64;

    for chunk in chunks {
        if options.cancel.is_cancelled() {
            debug!(
                "Upload of '{}' cancelled after {} bytes, discarding partial object",
                name, bytes_transferred
            );
            if let Err(e) = writer.abort() {
                warn!("Failed to discard partial upload of '{}': {}", name, e);
            }
            return Err(AccessError::Cancelled { bytes_transferred });
        }

        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                if let Err(abort_err) = writer.abort() {
                    warn!("Failed to discard partial upload of '{}': {}", name, abort_err);
                }
                return Err(interruption(e, bytes_transferred));
            }
        };

        if let Err(e) = writer.write_chunk(&chunk) {
            if let Err(abort_err) = writer.abort() {
                warn!("Failed to discard partial upload of '{}': {}", name, abort_err);
            }
            return Err(interruption(e, bytes_transferred));
        }
        bytes_transferred += chunk.len() as u64;
        progress(bytes_transferred);
    }

    if options.cancel.is_cancelled() {
        if let Err(e) = writer.abort() {
            warn!("Failed to discard partial upload of '{}': {}", name, e);
        }
        return Err(AccessError::Cancelled { bytes_transferred });
    }

    writer.commit()?;
    debug!("Uploaded '{}' ({} bytes)", name, bytes_transferred);

    // The backends do not all report the new object's handle on commit;
    // re-resolve it by name under the parent.
    let committed = session
        .list_children(parent)?
        .into_iter()
        .find(|child| child.name == name)
        .ok_or_else(|| AccessError::ObjectNotFound(name.to_string()))?;

    Ok(committed)
}

/// Stream a local reader into a new file object (convenience over [`write`])
pub fn write_from_reader<'a>(
    session: &'a dyn DeviceSession,
    parent: &ObjectId,
    name: &str,
    mut reader: impl Read,
    size_hint: Option<u64>,
    options: &TransferOptions,
    progress: impl FnMut(u64),
) -> Result<ObjectInfo> {
    let chunk_size = options.chunk_size.max(1);
    let chunks = std::iter::from_fn(move || {
        let mut chunk = vec![0u8; chunk_size];
        let mut filled = 0usize;
        while filled < chunk.len() {
            match reader.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(AccessError::Io(e.to_string()))),
            }
        }
        if filled == 0 {
            None
        } else {
            chunk.truncate(filled);
            Some(Ok(chunk))
        }
    });
    write(session, parent, name, chunks, size_hint, options, progress)
}

/// Keep disconnects distinct; wrap everything else as an interruption with
/// the progress made so far.
fn interruption(err: AccessError, bytes_transferred: u64) -> AccessError {
    match err {
        AccessError::DeviceDisconnected => AccessError::DeviceDisconnected,
        AccessError::Cancelled { .. } => err,
        AccessError::TransferInterrupted { .. } => err,
        other => AccessError::TransferInterrupted {
            bytes_transferred,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::traits::DeviceBackend;
    use crate::testdb::mock_backend::{MockBackend, MockFs};
    use std::io;

    fn device_with_files(files: &[(&str, &[u8])]) -> MockBackend {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        for (i, (name, content)) in files.iter().enumerate() {
            fs.add_file(&format!("f{}", i), "s1", name, content.to_vec());
        }
        MockBackend::single_device("dev-1", "Test Phone", fs)
    }

    fn collect_content(reader: ChunkReader<'_>) -> Vec<u8> {
        let mut content = Vec::new();
        for chunk in reader {
            content.extend_from_slice(&chunk.unwrap());
        }
        content
    }

    #[test]
    fn read_yields_bounded_chunks() {
        let backend = device_with_files(&[("data.bin", &[7u8; 10])]);
        let session = backend.open_device("dev-1").unwrap();
        let object = session
            .list_children(&ObjectId::from("s1"))
            .unwrap()
            .remove(0);

        let options = TransferOptions::with_chunk_size(4);
        let chunks: Vec<Vec<u8>> = read(session.as_ref(), &object, &options)
            .unwrap()
            .map(|c| c.unwrap())
            .collect();

        assert_eq!(
            chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
    }

    #[test]
    fn round_trip_preserves_content() {
        // Empty, single-chunk and multi-chunk files
        let cases: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"short".to_vec(),
            (0..=255u8).cycle().take(3 * 1024 + 7).collect(),
        ];

        for (i, content) in cases.into_iter().enumerate() {
            let backend = device_with_files(&[("orig.bin", &content)]);
            let session = backend.open_device("dev-1").unwrap();
            let storage = ObjectId::from("s1");
            let original = session.list_children(&storage).unwrap().remove(0);

            let options = TransferOptions::with_chunk_size(1024);
            let chunks = read(session.as_ref(), &original, &options).unwrap();
            let copy = write(
                session.as_ref(),
                &storage,
                "copy.bin",
                chunks,
                Some(content.len() as u64),
                &options,
                |_| {},
            )
            .unwrap();

            assert_eq!(copy.name, "copy.bin");
            assert_eq!(copy.size, content.len() as u64, "case {}", i);

            let copied = collect_content(read(session.as_ref(), &copy, &options).unwrap());
            assert_eq!(copied, content, "case {}", i);
        }
    }

    #[test]
    fn write_replaces_existing_object() {
        let backend = device_with_files(&[("report.txt", b"old contents")]);
        let session = backend.open_device("dev-1").unwrap();
        let storage = ObjectId::from("s1");

        let replaced = write(
            session.as_ref(),
            &storage,
            "report.txt",
            vec![Ok(b"new".to_vec())],
            Some(3),
            &TransferOptions::default(),
            |_| {},
        )
        .unwrap();
        assert_eq!(replaced.size, 3);

        // Exactly one object carries the name afterwards
        let children = session.list_children(&storage).unwrap();
        assert_eq!(children.len(), 1);
        let copied = collect_content(
            read(session.as_ref(), &children[0], &TransferOptions::default()).unwrap(),
        );
        assert_eq!(copied, b"new");
    }

    #[test]
    fn progress_reports_cumulative_bytes() {
        let backend = device_with_files(&[]);
        let session = backend.open_device("dev-1").unwrap();

        let chunks = vec![Ok(vec![0u8; 100]), Ok(vec![0u8; 50]), Ok(vec![0u8; 25])];
        let mut reported = Vec::new();
        write(
            session.as_ref(),
            &ObjectId::from("s1"),
            "out.bin",
            chunks,
            None,
            &TransferOptions::default(),
            |bytes| reported.push(bytes),
        )
        .unwrap();

        assert_eq!(reported, vec![100, 150, 175]);
    }

    #[test]
    fn cancelled_write_removes_partial_object() {
        let backend = device_with_files(&[]);
        let fs = backend.fs_handle("dev-1").unwrap();
        let session = backend.open_device("dev-1").unwrap();

        let cancel = CancelToken::new();
        let options = TransferOptions::default().with_cancel(cancel.clone());

        // Cancel after the first chunk has been produced
        let cancel_in_source = cancel.clone();
        let chunks = (0..4).map(move |i| {
            if i == 1 {
                cancel_in_source.cancel();
            }
            Ok(vec![0u8; 64])
        });

        let result = write(
            session.as_ref(),
            &ObjectId::from("s1"),
            "partial.bin",
            chunks,
            None,
            &options,
            |_| {},
        );

        match result {
            Err(AccessError::Cancelled { bytes_transferred }) => {
                assert_eq!(bytes_transferred, 64)
            }
            other => panic!("expected Cancelled, got {:?}", other.err()),
        }
        // The documented policy: no partial object remains
        assert!(fs.lock().unwrap().find_by_name("s1", "partial.bin").is_none());
    }

    #[test]
    fn failing_source_reports_interruption_with_progress() {
        let backend = device_with_files(&[]);
        let fs = backend.fs_handle("dev-1").unwrap();
        let session = backend.open_device("dev-1").unwrap();

        let chunks = vec![
            Ok(vec![0u8; 128]),
            Err(AccessError::Io("source went away".to_string())),
        ];
        let result = write(
            session.as_ref(),
            &ObjectId::from("s1"),
            "broken.bin",
            chunks,
            None,
            &TransferOptions::default(),
            |_| {},
        );

        match result {
            Err(AccessError::TransferInterrupted {
                bytes_transferred, ..
            }) => assert_eq!(bytes_transferred, 128),
            other => panic!("expected TransferInterrupted, got {:?}", other.err()),
        }
        assert!(fs.lock().unwrap().find_by_name("s1", "broken.bin").is_none());
    }

    #[test]
    fn disconnect_during_read_keeps_its_kind() {
        struct DropsConnection;
        impl io::Read for DropsConnection {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::NotConnected, "gone"))
            }
        }

        let mut reader = ChunkReader {
            reader: Box::new(DropsConnection),
            chunk_size: 16,
            cancel: CancelToken::new(),
            bytes_transferred: 0,
            done: false,
        };
        assert!(matches!(
            reader.next(),
            Some(Err(AccessError::DeviceDisconnected))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn cancelled_read_ends_the_sequence() {
        let content = vec![1u8; 64];
        let backend = device_with_files(&[("data.bin", &content)]);
        let session = backend.open_device("dev-1").unwrap();
        let object = session
            .list_children(&ObjectId::from("s1"))
            .unwrap()
            .remove(0);

        let cancel = CancelToken::new();
        let options = TransferOptions::with_chunk_size(16).with_cancel(cancel.clone());
        let mut chunks = read(session.as_ref(), &object, &options).unwrap();

        assert!(chunks.next().unwrap().is_ok());
        cancel.cancel();
        assert!(matches!(
            chunks.next(),
            Some(Err(AccessError::Cancelled { .. }))
        ));
        assert!(chunks.next().is_none());
    }

    #[test]
    fn write_from_reader_streams_everything() {
        let backend = device_with_files(&[]);
        let session = backend.open_device("dev-1").unwrap();

        let content: Vec<u8> = (0..=255u8).cycle().take(2048 + 13).collect();
        let object = write_from_reader(
            session.as_ref(),
            &ObjectId::from("s1"),
            "streamed.bin",
            io::Cursor::new(content.clone()),
            Some(content.len() as u64),
            &TransferOptions::with_chunk_size(512),
            |_| {},
        )
        .unwrap();

        assert_eq!(object.size, content.len() as u64);
        let copied = collect_content(
            read(session.as_ref(), &object, &TransferOptions::default()).unwrap(),
        );
        assert_eq!(copied, content);
    }
}
