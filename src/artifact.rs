//! Mined artifact loading
//!
//! The solver writes its result as a single-root BOC file. The message body
//! to forward to the giver is the first reference of that root cell.

use crate::boc::{deserialize_boc, Cell};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// The artifact file produced by one solver run
pub struct MinedArtifact {
    path: PathBuf,
}

impl MinedArtifact {
    /// Wrap an artifact path written by the solver
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Artifact location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the artifact, returning the message body cell.
    ///
    /// Fails on a missing, empty, or malformed file and on a root cell with
    /// no references; all of these end the cycle without touching the wallet.
    pub async fn load_body(&self) -> Result<Arc<Cell>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::artifact(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(Error::artifact(format!(
                "artifact {} is empty",
                self.path.display()
            )));
        }

        let roots = deserialize_boc(&bytes).map_err(|e| {
            Error::artifact(format!("malformed artifact {}: {}", self.path.display(), e))
        })?;
        let root = roots
            .first()
            .ok_or_else(|| Error::artifact("artifact has no root cell"))?;

        let body = root.as_slice().load_ref().map_err(|_| {
            Error::artifact("artifact root cell carries no message body reference")
        })?;

        debug!(
            "Loaded mined body: {} bits, {} refs",
            body.bit_len(),
            body.refs().len()
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boc::{serialize_boc, CellBuilder};
    use assert_matches::assert_matches;

    fn mined_boc() -> (Vec<u8>, Arc<Cell>) {
        let mut b = CellBuilder::new();
        b.store_uint(0xdead_beef, 32).unwrap();
        let body = Arc::new(b.build().unwrap());

        let mut b = CellBuilder::new();
        b.store_uint(0b10, 2).unwrap();
        b.store_ref(Arc::clone(&body)).unwrap();
        let root = Arc::new(b.build().unwrap());

        (serialize_boc(&root).unwrap(), body)
    }

    #[tokio::test]
    async fn test_load_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mined-0.boc");
        let (bytes, body) = mined_boc();
        std::fs::write(&path, bytes).unwrap();

        let loaded = MinedArtifact::new(&path).load_body().await.unwrap();
        assert_eq!(loaded.repr_hash(), body.repr_hash());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = MinedArtifact::new(dir.path().join("nope.boc"));
        assert_matches!(artifact.load_body().await, Err(Error::Artifact { .. }));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mined-0.boc");
        std::fs::write(&path, b"").unwrap();
        assert_matches!(
            MinedArtifact::new(&path).load_body().await,
            Err(Error::Artifact { .. })
        );
    }

    #[tokio::test]
    async fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mined-0.boc");
        let (bytes, _) = mined_boc();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert_matches!(
            MinedArtifact::new(&path).load_body().await,
            Err(Error::Artifact { .. })
        );
    }

    #[tokio::test]
    async fn test_root_without_body_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mined-0.boc");

        let mut b = CellBuilder::new();
        b.store_uint(0xff, 8).unwrap();
        let root = Arc::new(b.build().unwrap());
        std::fs::write(&path, serialize_boc(&root).unwrap()).unwrap();

        assert_matches!(
            MinedArtifact::new(&path).load_body().await,
            Err(Error::Artifact { .. })
        );
    }
}
