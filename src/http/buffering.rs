//! Request body staging.
//!
//! # Responsibilities
//! - Copy a body of unknown length to a temporary file
//! - Report its exact length so the upstream gets a Content-Length
//! - Delete the file once the upstream call is over
//!
//! # Design Decisions
//! - The file is owned by the request task; dropping the handle deletes it,
//!   so cancellation, early returns and failed staging clean up too
//! - Deletion failures are logged on every path, never fatal

use std::env;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::{stream, Stream, StreamExt};
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

/// Size of the write buffer used while staging.
pub const STAGING_BUFFER_SIZE: usize = 1024 * 1024;

const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("temporary file: {0}")]
    Io(#[from] io::Error),

    #[error("reading request body: {0}")]
    Body(#[source] axum::Error),
}

/// A request body staged on disk.
#[derive(Debug)]
pub struct StagedBody {
    temp: Option<NamedTempFile>,
    path: PathBuf,
    file: Option<File>,
    len: u64,
}

impl StagedBody {
    /// Copy `body` to a fresh file in the system temporary directory.
    pub async fn stage(body: Body) -> Result<Self, StagingError> {
        Self::stage_in(&env::temp_dir(), body).await
    }

    /// Copy `body` to a fresh temporary file under `dir`, sync it and rewind it.
    ///
    /// On failure the partial file is removed before returning.
    pub async fn stage_in(dir: &Path, body: Body) -> Result<Self, StagingError> {
        let temp = NamedTempFile::new_in(dir)?;
        let file = File::from_std(temp.as_file().try_clone()?);
        let mut staged = Self {
            path: temp.path().to_path_buf(),
            temp: Some(temp),
            file: None,
            len: 0,
        };

        let mut writer = BufWriter::with_capacity(STAGING_BUFFER_SIZE, file);
        let mut chunks = body.into_data_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(StagingError::Body)?;
            writer.write_all(&chunk).await?;
            staged.len += chunk.len() as u64;
        }
        writer.flush().await?;

        let mut file = writer.into_inner();
        file.sync_all().await?;
        file.seek(SeekFrom::Start(0)).await?;
        staged.file = Some(file);

        tracing::debug!(path = ?staged.path, bytes = staged.len, "Request body staged");
        Ok(staged)
    }

    /// Exact number of staged bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Body streaming the staged bytes. The second call returns an empty body.
    pub fn take_body(&mut self) -> Body {
        match self.file.take() {
            Some(file) => Body::from_stream(read_chunks(file)),
            None => Body::empty(),
        }
    }

    /// Delete the staged file.
    pub fn release(mut self) {
        self.delete();
    }

    fn delete(&mut self) {
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                tracing::warn!(path = ?self.path, error = %e, "Failed to delete staged request body");
            }
        }
    }
}

impl Drop for StagedBody {
    fn drop(&mut self) {
        self.delete();
    }
}

fn read_chunks(file: File) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        if file.read_buf(&mut buf).await? == 0 {
            return Ok(None);
        }
        Ok(Some((buf.freeze(), file)))
    })
}
