use sociopedia::storage::{
    LocalDiskStorage, MAX_STORED_NAME_LEN, MockStorageService, S3StorageClient, StagedFile,
    StorageService, derive_stored_name, url_segment,
};

async fn staged(root: &std::path::Path, bytes: &[u8]) -> StagedFile {
    let mut file = StagedFile::create(root).await.unwrap();
    file.write(bytes).await.unwrap();
    file.finish().await.unwrap();
    file
}

#[cfg(test)]
mod naming_tests {
    use super::*;

    #[test]
    fn test_plain_name_is_kept() {
        assert_eq!(derive_stored_name("avatar.png").as_deref(), Some("avatar.png"));
        assert_eq!(
            derive_stored_name("  holiday photo.jpg ").as_deref(),
            Some("holiday photo.jpg")
        );
    }

    #[test]
    fn test_directories_are_stripped() {
        assert_eq!(derive_stored_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(
            derive_stored_name("C:\\Users\\me\\pic.png").as_deref(),
            Some("pic.png")
        );
    }

    #[test]
    fn test_name_length_is_capped() {
        let longest = "a".repeat(MAX_STORED_NAME_LEN);
        assert_eq!(derive_stored_name(&longest), Some(longest.clone()));
        assert_eq!(derive_stored_name(&format!("{longest}a")), None);
        // The cap is in bytes, not characters.
        assert_eq!(derive_stored_name(&"é".repeat(128)), None);
    }

    #[test]
    fn test_url_segment_escapes_reserved_characters() {
        assert_eq!(url_segment("plain-name_1.png"), "plain-name_1.png");
        assert_eq!(url_segment("cat?v=2.png"), "cat%3Fv=2.png");
        assert_eq!(url_segment("a#b.png"), "a%23b.png");
        assert_eq!(url_segment("my photo.png"), "my%20photo.png");
        assert_eq!(url_segment("100%.png"), "100%25.png");
        assert_eq!(url_segment("café.png"), "caf%C3%A9.png");
    }

    #[test]
    fn test_unusable_names_are_refused() {
        for declared in ["", "   ", "..", ".", ".env", "dir/", "bad\nname.png"] {
            assert_eq!(derive_stored_name(declared), None, "{declared:?}");
        }
    }
}

#[cfg(test)]
mod staging_tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_staged_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let file = staged(dir.path(), b"partial").await;
        let path = file.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(file.size(), 7);

        drop(file);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_staging_directory_is_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/staging");

        let file = staged(&root, b"x").await;

        assert!(file.path().starts_with(&root));
        assert!(file.path().to_string_lossy().ends_with(".part"));
    }
}

#[cfg(test)]
mod disk_tests {
    use super::*;

    #[tokio::test]
    async fn test_persist_moves_staged_bytes_into_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path().join("assets"));
        let file = staged(&dir.path().join("staging"), b"hello").await;
        let staged_path = file.path().to_path_buf();

        storage.persist(file, "hello.txt", "text/plain").await.unwrap();

        assert!(!staged_path.exists());
        assert!(storage.exists("hello.txt").await);
        let stored = std::fs::read(dir.path().join("assets/hello.txt")).unwrap();
        assert_eq!(stored, b"hello");
    }

    #[tokio::test]
    async fn test_persist_replaces_existing_name() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let storage = LocalDiskStorage::new(dir.path().join("assets"));

        storage
            .persist(staged(&staging, b"old").await, "same.png", "image/png")
            .await
            .unwrap();
        storage
            .persist(staged(&staging, b"new").await, "same.png", "image/png")
            .await
            .unwrap();

        let stored = std::fs::read(dir.path().join("assets/same.png")).unwrap();
        assert_eq!(stored, b"new");
    }

    #[tokio::test]
    async fn test_locate_and_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path());

        assert_eq!(storage.locate("a.png"), "/assets/a.png");
        assert_eq!(storage.locate("my photo.png"), "/assets/my%20photo.png");
        assert!(!storage.exists("a.png").await);
    }

    #[tokio::test]
    async fn test_ensure_ready_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path().join("fresh"));

        storage.ensure_ready().await.unwrap();

        assert!(storage.root().is_dir());
    }
}

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockStorageService::new();

        mock.persist(staged(dir.path(), b"clip").await, "clip.mp4", "video/mp4")
            .await
            .unwrap();

        assert_eq!(mock.object("clip.mp4").as_deref(), Some(&b"clip"[..]));
        assert!(mock.exists("clip.mp4").await);
        assert_eq!(mock.locate("clip.mp4"), "mock://clip.mp4");
        // The staged copy is discarded once the mock has read it.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockStorageService::new_failing();

        let result = mock
            .persist(staged(dir.path(), b"clip").await, "clip.mp4", "video/mp4")
            .await;

        assert!(result.is_err());
        assert!(mock.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    #[tokio::test]
    async fn test_s3_client_creation() {
        let client = S3StorageClient::new(
            "http://localhost:9000/",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        );

        assert_eq!(
            client.locate("avatar.png"),
            "http://localhost:9000/testbucket/avatar.png"
        );
        assert_eq!(
            client.locate("a#b.png"),
            "http://localhost:9000/testbucket/a%23b.png"
        );
    }
}
