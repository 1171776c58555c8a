use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::{ObjectStore, PayloadStream, StoreError, StoreResult};

/// Stores objects as files below a root directory.
#[derive(Debug)]
pub struct LocalFsStore {
    path: PathBuf,
}

impl LocalFsStore {
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }

    /// Maps a key onto a path below the root, rejecting keys that would escape it.
    fn object_path(&self, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let is_contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        if key.is_empty() || !is_contained {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }

        Ok(self.path.join(relative))
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalFsStore {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    async fn get_object(&self, key: &str) -> StoreResult<PayloadStream> {
        let path = self.object_path(key)?;
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_owned()));
            }
            Err(err) => return Err(err.into()),
        };

        Ok(ReaderStream::new(file).map_err(StoreError::from).boxed())
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> StoreResult<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        file.write_all(&payload).await?;
        file.sync_data().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_objects_in_nested_directories() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(tempdir.path());

        store
            .put_object("worker0/obj.dat", Bytes::from_static(b"oh hai!"))
            .await
            .unwrap();
        assert!(tempdir.path().join("worker0/obj.dat").is_file());

        let stream = store.get_object("worker0/obj.dat").await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"oh hai!");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(tempdir.path());

        let Err(err) = store.get_object("nope").await else {
            panic!("expected missing object to fail");
        };
        assert!(matches!(err, StoreError::NotFound(key) if key == "nope"));
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(tempdir.path());

        for key in ["../outside", "/etc/passwd", "a/../../b", ""] {
            let err = store
                .put_object(key, Bytes::from_static(b"x"))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "{key}");
        }
    }
}
