//! Lazy, race-tolerant traversal of a device tree
//!
//! A [`Walker`] visits folders top-down, yielding for each one its virtual
//! path plus the immediate child folders and files, then descending into
//! the child folders. The device filesystem can change under the walk at
//! any moment — the phone's own apps delete files, the user unplugs the
//! cable — so staleness is an expected condition, not an exception:
//!
//! - an entry that can no longer be resolved when it is visited is
//!   skipped, and the walk continues with its siblings
//! - an entry whose name cannot be resolved is treated the same way and
//!   never appears in the output
//! - a device disconnect ends the walk: it is yielded once as an error,
//!   after which the iterator is fused
//!
//! Skipped entries can be observed through [`Walker::with_skip_handler`];
//! they are never mixed into the yielded sequence. Consumption may stop at
//! any point — the walker holds no device resources beyond its queue of
//! pending folder handles.

use log::{debug, trace, warn};
use std::collections::VecDeque;

use crate::core::error::{AccessError, Result};
use crate::device::object::{join_virtual_path, ObjectId, ObjectInfo};
use crate::device::traits::DeviceSession;
use crate::transfer::CancelToken;

/// One visited folder: its virtual path and immediate children
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Virtual path of the visited folder, `/`-separated
    pub path: String,
    /// Child folders (and storages), sorted by name
    pub folders: Vec<ObjectInfo>,
    /// Child files, sorted by name
    pub files: Vec<ObjectInfo>,
}

/// Callback invoked for entries the walk skipped over
pub type SkipHandler<'a> = Box<dyn FnMut(&str, &AccessError) + 'a>;

/// Lazy top-down iterator over a device subtree
pub struct Walker<'a> {
    session: &'a dyn DeviceSession,
    pending: VecDeque<(String, ObjectId)>,
    cancel: CancelToken,
    on_skip: Option<SkipHandler<'a>>,
    done: bool,
}

impl<'a> Walker<'a> {
    /// Walk the subtree rooted at one container object.
    ///
    /// `root_path` becomes the path of the first yielded entry; child paths
    /// are built from it as the walk descends.
    pub fn new(session: &'a dyn DeviceSession, root_path: impl Into<String>, root: ObjectId) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back((root_path.into(), root));
        Self {
            session,
            pending,
            cancel: CancelToken::new(),
            on_skip: None,
            done: false,
        }
    }

    /// Walk several roots in sequence (e.g. all storages of a device)
    pub fn with_roots(
        session: &'a dyn DeviceSession,
        roots: impl IntoIterator<Item = (String, ObjectId)>,
    ) -> Self {
        Self {
            session,
            pending: roots.into_iter().collect(),
            cancel: CancelToken::new(),
            on_skip: None,
            done: false,
        }
    }

    /// Stop the walk cooperatively when `cancel` is triggered
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Observe skipped entries (vanished or unreadable mid-walk)
    pub fn with_skip_handler(mut self, handler: SkipHandler<'a>) -> Self {
        self.on_skip = Some(handler);
        self
    }

    fn notify_skip(&mut self, path: &str, err: &AccessError) {
        debug!("Skipping '{}': {}", path, err);
        if let Some(handler) = self.on_skip.as_mut() {
            handler(path, err);
        }
    }

    /// Expand one pending folder into a walk entry
    fn expand(&mut self, path: String, id: ObjectId) -> Option<Result<WalkEntry>> {
        let children = match self.session.list_children(&id) {
            Ok(children) => children,
            Err(err) if err.is_entry_recoverable() => {
                // The folder vanished (or got locked) between being listed
                // and being visited: prune this subtree, keep walking.
                self.notify_skip(&path, &err);
                return None;
            }
            Err(err) => {
                if err.is_disconnect() {
                    warn!("Device disconnected during walk at '{}'", path);
                } else {
                    warn!("Walk aborted at '{}': {}", path, err);
                }
                self.done = true;
                return Some(Err(err));
            }
        };

        let mut folders = Vec::new();
        let mut files = Vec::new();
        for child in children {
            if child.name.trim().is_empty() {
                // Same class as a vanished entry: no name, no path entry
                self.notify_skip(&path, &AccessError::ObjectNotFound(child.id.to_string()));
                continue;
            }
            if child.is_container() {
                folders.push(child);
            } else {
                files.push(child);
            }
        }
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));

        // Paths are built from the accumulated prefix and the name seen
        // right now, never from an earlier snapshot of an ancestor.
        for folder in &folders {
            self.pending
                .push_back((join_virtual_path(&path, &folder.name), folder.id.clone()));
        }

        trace!(
            "Visited '{}': {} folder(s), {} file(s)",
            path,
            folders.len(),
            files.len()
        );

        Some(Ok(WalkEntry {
            path,
            folders,
            files,
        }))
    }
}

impl Iterator for Walker<'_> {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.cancel.is_cancelled() {
                debug!("Walk cancelled");
                self.done = true;
                return None;
            }
            let (path, id) = self.pending.pop_front()?;
            match self.expand(path, id) {
                Some(item) => return Some(item),
                // Entry was skipped; move on to the next pending folder
                None => continue,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::mock_backend::{MockBackend, MockConfig, MockFs};
    use crate::device::traits::DeviceBackend;

    /// Device tree used by most walk tests:
    /// `Internal Storage/A/f1.txt` and `Internal Storage/A/B/f2.txt`
    fn nested_tree() -> MockFs {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        fs.add_folder("a", "s1", "A");
        fs.add_folder("b", "a", "B");
        fs.add_file("f1", "a", "f1.txt", b"one".to_vec());
        fs.add_file("f2", "b", "f2.txt", b"two".to_vec());
        fs
    }

    fn names(objects: &[ObjectInfo]) -> Vec<&str> {
        objects.iter().map(|o| o.name.as_str()).collect()
    }

    #[test]
    fn walks_top_down_with_full_paths() {
        let backend = MockBackend::single_device("dev-1", "Test Phone", nested_tree());
        let session = backend.open_device("dev-1").unwrap();

        let walker = Walker::new(session.as_ref(), "Internal Storage", ObjectId::from("s1"));
        let entries: Vec<WalkEntry> = walker.map(|e| e.unwrap()).collect();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, "Internal Storage");
        assert_eq!(names(&entries[0].folders), vec!["A"]);
        assert_eq!(entries[1].path, "Internal Storage/A");
        assert_eq!(names(&entries[1].folders), vec!["B"]);
        assert_eq!(names(&entries[1].files), vec!["f1.txt"]);
        assert_eq!(entries[2].path, "Internal Storage/A/B");
        assert_eq!(names(&entries[2].files), vec!["f2.txt"]);
    }

    #[test]
    fn folder_deleted_mid_walk_is_skipped() {
        let backend = MockBackend::single_device("dev-1", "Test Phone", nested_tree());
        let fs = backend.fs_handle("dev-1").unwrap();
        let session = backend.open_device("dev-1").unwrap();

        let mut skipped = Vec::new();
        {
            let mut walker = Walker::new(session.as_ref(), "A", ObjectId::from("a"))
                .with_skip_handler(Box::new(|path, _err| skipped.push(path.to_string())));

            // First entry lists A with subfolder B and file f1.txt
            let first = walker.next().unwrap().unwrap();
            assert_eq!(first.path, "A");
            assert_eq!(names(&first.folders), vec!["B"]);
            assert_eq!(names(&first.files), vec!["f1.txt"]);

            // B is deleted on the device before the walk reaches it
            fs.lock().unwrap().remove_object("b");

            // The walk completes without error and without A/B
            assert!(walker.next().is_none());
        }
        assert_eq!(skipped, vec!["A/B".to_string()]);
    }

    #[test]
    fn denied_subfolder_is_skipped_not_fatal() {
        let mut fs = nested_tree();
        fs.set_config(MockConfig {
            denied_objects: vec!["b".to_string()],
            ..Default::default()
        });
        let backend = MockBackend::single_device("dev-1", "Test Phone", fs);
        let session = backend.open_device("dev-1").unwrap();

        let mut skipped = Vec::new();
        let entries: Vec<WalkEntry> = Walker::new(
            session.as_ref(),
            "Internal Storage",
            ObjectId::from("s1"),
        )
        .with_skip_handler(Box::new(|path, err| {
            assert!(err.is_entry_recoverable());
            skipped.push(path.to_string());
        }))
        .map(|e| e.unwrap())
        .collect();

        // A is visited and still lists B; only B's own expansion is skipped
        assert_eq!(entries.len(), 2);
        assert_eq!(names(&entries[1].folders), vec!["B"]);
        assert_eq!(skipped, vec!["Internal Storage/A/B".to_string()]);
    }

    #[test]
    fn nameless_entries_are_suppressed() {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        fs.add_file("ok", "s1", "ok.txt", b"x".to_vec());
        fs.add_file("broken", "s1", "   ", b"y".to_vec());

        let backend = MockBackend::single_device("dev-1", "Test Phone", fs);
        let session = backend.open_device("dev-1").unwrap();

        let entries: Vec<WalkEntry> =
            Walker::new(session.as_ref(), "Internal Storage", ObjectId::from("s1"))
                .map(|e| e.unwrap())
                .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(names(&entries[0].files), vec!["ok.txt"]);
    }

    #[test]
    fn disconnect_terminates_the_walk() {
        let backend = MockBackend::single_device_with_config(
            "dev-1",
            "Test Phone",
            nested_tree(),
            MockConfig {
                disconnect_after_lists: Some(1),
                ..Default::default()
            },
        );
        let session = backend.open_device("dev-1").unwrap();

        let mut walker = Walker::new(session.as_ref(), "Internal Storage", ObjectId::from("s1"));

        assert!(walker.next().unwrap().is_ok());
        match walker.next() {
            Some(Err(AccessError::DeviceDisconnected)) => {}
            other => panic!("expected DeviceDisconnected, got {:?}", other),
        }
        // Fused after the disconnect
        assert!(walker.next().is_none());
    }

    #[test]
    fn disconnect_of_one_device_leaves_the_other_walkable() {
        let mut backend = MockBackend::new();
        backend.add_device("dev-1", "Phone One", nested_tree());
        backend.add_device_with_config(
            "dev-2",
            "Phone Two",
            nested_tree(),
            MockConfig {
                disconnect_after_lists: Some(0),
                ..Default::default()
            },
        );

        let session2 = backend.open_device("dev-2").unwrap();
        let mut walker2 = Walker::new(session2.as_ref(), "Internal Storage", ObjectId::from("s1"));
        assert!(matches!(
            walker2.next(),
            Some(Err(AccessError::DeviceDisconnected))
        ));

        let session1 = backend.open_device("dev-1").unwrap();
        let entries: Vec<_> =
            Walker::new(session1.as_ref(), "Internal Storage", ObjectId::from("s1"))
                .map(|e| e.unwrap())
                .collect();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn cancellation_stops_the_walk_cleanly() {
        let backend = MockBackend::single_device("dev-1", "Test Phone", nested_tree());
        let session = backend.open_device("dev-1").unwrap();

        let cancel = CancelToken::new();
        let mut walker = Walker::new(session.as_ref(), "Internal Storage", ObjectId::from("s1"))
            .with_cancel(cancel.clone());

        assert!(walker.next().is_some());
        cancel.cancel();
        assert!(walker.next().is_none());
    }

    #[test]
    fn multiple_roots_walk_in_sequence() {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        fs.add_storage("s2", "SD card");
        fs.add_file("f1", "s1", "a.txt", b"a".to_vec());
        fs.add_file("f2", "s2", "b.txt", b"b".to_vec());

        let backend = MockBackend::single_device("dev-1", "Test Phone", fs);
        let session = backend.open_device("dev-1").unwrap();

        let roots = vec![
            ("Internal Storage".to_string(), ObjectId::from("s1")),
            ("SD card".to_string(), ObjectId::from("s2")),
        ];
        let entries: Vec<WalkEntry> = Walker::with_roots(session.as_ref(), roots)
            .map(|e| e.unwrap())
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "Internal Storage");
        assert_eq!(entries[1].path, "SD card");
    }
}
