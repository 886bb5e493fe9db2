//! Single-file transfers between memory, local paths and the server.
//!
//! In-memory content is staged in a temp file under the session's staging
//! directory; the temp file is removed once the transfer finishes.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::session::FtpSession;
use std::path::Path;
use tempfile::NamedTempFile;
use webfuse_core::ensure_dir;

impl FtpSession {
    fn staging_file(&self, prefix: &str) -> FtpResult<NamedTempFile> {
        let dir = self.staging_dir();
        ensure_dir(dir)?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(dir)
            .map_err(|e| FtpError::io_error(format!("Cannot stage in {}: {}", dir.display(), e)))
    }

    /// Upload `content` as `remote`.
    pub async fn put_from_string(&mut self, remote: &str, content: impl AsRef<[u8]>) -> FtpResult<u64> {
        self.ensure_authenticated()?;
        let staged = self.staging_file("put-")?;
        tokio::fs::write(staged.path(), content.as_ref()).await?;
        self.put(staged.path(), remote).await
    }

    /// Upload the local file `local` as `remote`.
    pub async fn put_from_path(&mut self, local: impl AsRef<Path>, remote: &str) -> FtpResult<u64> {
        self.ensure_authenticated()?;
        let local = local.as_ref();
        if !local.is_file() {
            return Err(FtpError::not_found(format!("Local file {} does not exist", local.display())));
        }
        self.put(local, remote).await
    }

    /// Download `remote` to `local`, creating missing local parents.
    pub async fn get_to_path(&mut self, remote: &str, local: impl AsRef<Path>) -> FtpResult<u64> {
        self.ensure_authenticated()?;
        let local = local.as_ref();
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        self.get(remote, local).await
    }

    /// Download `remote` and return its bytes.
    pub async fn get_content(&mut self, remote: &str) -> FtpResult<Vec<u8>> {
        self.ensure_authenticated()?;
        let staged = self.staging_file("get-")?;
        self.get(remote, staged.path()).await?;
        let bytes = tokio::fs::read(staged.path()).await?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use crate::ftp::error::FtpErrorKind;
    use crate::ftp::testing::{logged_in_session, memory_session, MemoryFs};

    #[tokio::test]
    async fn string_round_trip_through_staging() {
        let fs = MemoryFs::shared();
        fs.lock().unwrap().add_dir("/inbox");
        let (mut session, _root) = logged_in_session(&fs).await;

        let sent = session.put_from_string("/inbox/note.txt", "hello ftp").await.unwrap();
        assert_eq!(sent, 9);
        assert_eq!(fs.lock().unwrap().file("/inbox/note.txt"), Some(&b"hello ftp"[..]));

        let back = session.get_content("/inbox/note.txt").await.unwrap();
        assert_eq!(back, b"hello ftp");

        // Staged temp files are gone.
        let leftovers = std::fs::read_dir(session.staging_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn path_transfers() {
        let fs = MemoryFs::shared();
        fs.lock().unwrap().add_file("/pub/data.bin", &[7u8; 64]);
        let (mut session, _root) = logged_in_session(&fs).await;
        let local = tempfile::tempdir().unwrap();

        let target = local.path().join("nested/dir/data.bin");
        assert_eq!(session.get_to_path("/pub/data.bin", &target).await.unwrap(), 64);
        assert_eq!(std::fs::read(&target).unwrap(), vec![7u8; 64]);

        assert_eq!(session.put_from_path(&target, "/pub/copy.bin").await.unwrap(), 64);
        assert!(session.is_file("/pub/copy.bin").await);

        let err = session
            .put_from_path(local.path().join("missing"), "/pub/x")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FtpErrorKind::NotFound);
    }

    #[tokio::test]
    async fn transfers_require_login() {
        let fs = MemoryFs::shared();
        let (mut session, _root) = memory_session(&fs);
        let err = session.put_from_string("/x", "y").await.unwrap_err();
        assert_eq!(err.kind, FtpErrorKind::NotAuthenticated);
        assert!(session.get_content("/x").await.is_err());
    }
}
