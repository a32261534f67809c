//! ZIP archive backend for radblob.
//!
//! [`ArchiveBlobManager`] stores each blob as one deflate-compressed ZIP entry
//! named by its ID. The archive can live in a caller-supplied buffer (read
//! only), a heap buffer (write), a file, or a window of an already-open file.
//!
//! # Architecture
//!
//! - **ArchiveWindow**: byte window over a file so an archive can sit inside a
//!   larger container
//! - **ArchiveStorage**: heap buffer or file window the ZIP codec reads and
//!   writes; **SharedStorage** lets the writer and the manager hold it at once
//! - **central**: first-wins name index read from the raw central directory,
//!   and entry reads by local header offset
//! - **ArchiveBlobManager**: the reader/writer state machine; reads during a
//!   write session go by offset, and the central directory is written once,
//!   at deinit

pub mod archive;
pub mod central;
pub mod config;
pub mod storage;
pub mod window;

pub use archive::{ArchiveBlobManager, ArchiveOrigin};
pub use central::{CentralEntry, CentralIndex};
pub use config::ArchiveConfig;
pub use storage::{codec_error, ArchiveStorage, SharedStorage};
pub use window::ArchiveWindow;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use radblob_store::{
        compute_id, BlobError, BlobFlags, BlobManager, LooseFileBlobManager, MemoryBlobManager,
        MultiBlobManager,
    };

    fn memory() -> MemoryBlobManager {
        let mut mgr = MemoryBlobManager::new();
        mgr.init(BlobFlags::READ_WRITE).unwrap();
        mgr
    }

    fn loose(dir: &std::path::Path) -> LooseFileBlobManager {
        let mut mgr = LooseFileBlobManager::new();
        mgr.init(BlobFlags::READ_WRITE, dir).unwrap();
        mgr
    }

    fn heap() -> ArchiveBlobManager {
        let mut mgr = ArchiveBlobManager::new();
        mgr.init_heap(BlobFlags::READ_WRITE).unwrap();
        mgr
    }

    // -----------------------------------------------------------------------
    // Contract shared by every backend
    // -----------------------------------------------------------------------

    #[test]
    fn every_backend_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file_archive = ArchiveBlobManager::new();
        file_archive
            .init_file(BlobFlags::READ_WRITE, tmp.path().join("a.zip"), 0, 0)
            .unwrap();

        let mut backends: Vec<Box<dyn BlobManager>> = vec![
            Box::new(memory()),
            Box::new(loose(&tmp.path().join("loose"))),
            Box::new(heap()),
            Box::new(file_archive),
        ];

        let payload = b"the same bytes everywhere".as_slice();
        let expected_id = compute_id(payload, "", "", None).unwrap();
        for backend in backends.iter_mut() {
            let id = backend.add_buf_using_id(payload, "").unwrap();
            assert_eq!(id, expected_id, "{}", backend.kind());
            assert_eq!(backend.get(&id).unwrap(), payload, "{}", backend.kind());
            assert_eq!(backend.get_size(&id), payload.len() as u64);
            assert_eq!(backend.enumerate(), vec![id.clone()]);
            assert_eq!(backend.add_buf_using_id(payload, "").unwrap(), id);
            assert_eq!(backend.enumerate().len(), 1);
        }
    }

    #[test]
    fn write_to_read_only_is_denied_everywhere() {
        let tmp = tempfile::tempdir().unwrap();

        let mut mem = MemoryBlobManager::new();
        mem.init(BlobFlags::READABLE).unwrap();
        let mut dir = LooseFileBlobManager::new();
        dir.init(BlobFlags::READABLE, tmp.path()).unwrap();
        let mut archive = ArchiveBlobManager::new();
        archive
            .init_memory(BlobFlags::READABLE, {
                let mut writer = ArchiveBlobManager::new();
                writer.init_heap(BlobFlags::WRITABLE).unwrap();
                writer.deinit_heap().unwrap()
            })
            .unwrap();

        let backends: [&mut dyn BlobManager; 3] = [&mut mem, &mut dir, &mut archive];
        for backend in backends {
            let err = backend.add_buf_using_id(b"nope", "").unwrap_err();
            assert!(matches!(err, BlobError::CapabilityDenied { .. }), "{}", backend.kind());
            assert!(backend.enumerate().is_empty());
        }
    }

    // -----------------------------------------------------------------------
    // Cross-backend populate
    // -----------------------------------------------------------------------

    #[test]
    fn pack_and_unpack_loose_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut source = loose(&tmp.path().join("src"));
        let ids: Vec<String> = ["one", "two", "three"]
            .iter()
            .map(|s| source.add_buf_using_id(s.as_bytes(), "").unwrap())
            .collect();

        let archive_path = tmp.path().join("packed.zip");
        let mut packed = ArchiveBlobManager::new();
        packed
            .init_file(BlobFlags::WRITABLE, &archive_path, 0, 0)
            .unwrap();
        packed.populate(&source).unwrap();
        packed.deinit().unwrap();

        let mut archive = ArchiveBlobManager::new();
        archive
            .init_file(BlobFlags::READABLE, &archive_path, 0, 0)
            .unwrap();
        let mut restored = loose(&tmp.path().join("dst"));
        restored.populate(&archive).unwrap();

        assert_eq!(restored.enumerate(), source.enumerate());
        for id in &ids {
            assert_eq!(restored.get(id).unwrap(), source.get(id).unwrap());
        }
    }

    #[test]
    fn copy_file_between_archive_and_memory() {
        let mut archive = heap();
        let id = archive.add_buf_using_id(b"copy me", "").unwrap();
        let mut mem = memory();
        mem.copy_file(&archive, &id, "copied").unwrap();
        assert_eq!(mem.get("copied").unwrap(), b"copy me");
    }

    // -----------------------------------------------------------------------
    // Multi manager over mixed backends
    // -----------------------------------------------------------------------

    #[test]
    fn multi_precedence_across_backends() {
        let tmp = tempfile::tempdir().unwrap();
        let mut archive = heap();
        archive.add_buf_using_id(b"from archive", "x").unwrap();
        archive.add_buf_using_id(b"only archive", "a").unwrap();
        let mut dir = loose(tmp.path());
        dir.add_buf_using_id(b"from dir", "x").unwrap();
        dir.add_buf_using_id(b"only dir", "d").unwrap();

        let mut multi = MultiBlobManager::new();
        multi.init(BlobFlags::READABLE).unwrap();
        multi.add_blob_manager(&archive).unwrap();
        multi.add_blob_manager(&dir).unwrap();

        assert_eq!(multi.get("x").unwrap(), b"from archive");
        assert_eq!(multi.get("d").unwrap(), b"only dir");
        assert_eq!(multi.enumerate(), vec!["a", "d", "x"]);

        let stream = multi.open("d").unwrap().unwrap();
        assert_eq!(stream.origin(), Some(1));
        multi.close(stream);

        assert!(multi.remove_blob_manager(&archive));
        assert_eq!(multi.get("x").unwrap(), b"from dir");
    }

    #[test]
    fn multi_populates_writable_archive() {
        let a = {
            let mut m = memory();
            m.add_buf_using_id(b"1", "a").unwrap();
            m
        };
        let b = {
            let mut m = memory();
            m.add_buf_using_id(b"2", "b").unwrap();
            m.add_buf_using_id(b"3", "a").unwrap();
            m
        };
        let mut multi = MultiBlobManager::new();
        multi.init(BlobFlags::READABLE).unwrap();
        multi.add_blob_manager(&a).unwrap();
        multi.add_blob_manager(&b).unwrap();

        let mut out = heap();
        out.populate(&multi).unwrap();
        assert_eq!(out.enumerate(), vec!["a", "b"]);
        assert_eq!(out.get("a").unwrap(), b"1");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn archive_round_trips_any_blob(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let mut writer = ArchiveBlobManager::new();
            writer.init_heap(BlobFlags::WRITABLE).unwrap();
            let id = writer.add_buf_using_id(&data, "").unwrap();
            let bytes = writer.deinit_heap().unwrap();

            let mut reader = ArchiveBlobManager::new();
            reader.init_memory(BlobFlags::READABLE, bytes).unwrap();
            prop_assert_eq!(reader.get(&id).unwrap(), data);
        }

        #[test]
        fn multi_enumerate_is_sorted_union(
            left in proptest::collection::btree_set("[a-f]{1,3}", 0..8),
            right in proptest::collection::btree_set("[a-f]{1,3}", 0..8),
        ) {
            let mut a = memory();
            for id in &left {
                a.add_buf_using_id(id.as_bytes(), id).unwrap();
            }
            let mut b = memory();
            for id in &right {
                b.add_buf_using_id(id.as_bytes(), id).unwrap();
            }
            let mut multi = MultiBlobManager::new();
            multi.init(BlobFlags::READABLE).unwrap();
            multi.add_blob_manager(&a).unwrap();
            multi.add_blob_manager(&b).unwrap();

            let expected: Vec<String> = left.union(&right).cloned().collect();
            prop_assert_eq!(multi.enumerate(), expected);
        }
    }
}
