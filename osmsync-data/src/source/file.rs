use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::io;
use url::Url;

use super::{BlobReader, BlobSource, FetchError};

/// Reads `file://` URIs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBlobSource;

impl FileBlobSource {
    fn path(uri: &Url) -> Result<Utf8PathBuf, FetchError> {
        let invalid = || FetchError::Io {
            uri: uri.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a local UTF-8 file path"),
        };
        let path = uri.to_file_path().map_err(|()| invalid())?;
        Utf8PathBuf::from_path_buf(path).map_err(|_| invalid())
    }
}

#[async_trait(?Send)]
impl BlobSource for FileBlobSource {
    async fn fetch(&self, uri: &Url) -> Result<BlobReader, FetchError> {
        let path = Self::path(uri)?;
        let file = osmsync_fs::open_file(&path).map_err(|source| FetchError::io(uri, source))?;
        Ok(Box::new(io::BufReader::new(file.into_std())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Read;
    use tempfile::TempDir;
    use tokio::runtime::Builder;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build Tokio runtime")
            .block_on(future)
    }

    #[rstest]
    fn reads_existing_files() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("001.state.txt");
        std::fs::write(&path, "sequenceNumber=1\n").expect("write fixture");
        let uri = Url::from_file_path(&path).expect("absolute path");

        let mut contents = String::new();
        block_on(FileBlobSource.fetch(&uri))
            .expect("fetch file")
            .read_to_string(&mut contents)
            .expect("read payload");
        assert_eq!(contents, "sequenceNumber=1\n");
    }

    #[rstest]
    fn missing_files_are_not_found() {
        let dir = TempDir::new().expect("create temp dir");
        let uri = Url::from_file_path(dir.path().join("absent.osc.gz")).expect("absolute path");
        let error = block_on(FileBlobSource.fetch(&uri)).err().expect("file is missing");
        assert!(error.is_not_found());
    }
}
