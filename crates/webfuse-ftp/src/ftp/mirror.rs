//! Recursive upload and download of directory trees.
//!
//! Both directions create the mirrored root on the destination side
//! (`<dest>/<basename of source>`), then walk the source depth-first,
//! creating directories before transferring the files inside them.
//! Links to files are transferred; links to directories are not followed.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::session::FtpSession;
use crate::ftp::parser;
use crate::ftp::types::{EntryKind, MirrorReport};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use webfuse_core::{ensure_dir, scan_dir_recursively};

impl FtpSession {
    /// Mirror the remote directory `remote_dir` into `local_dir`.
    pub async fn download_dir(&mut self, remote_dir: &str, local_dir: impl AsRef<Path>) -> FtpResult<MirrorReport> {
        self.ensure_authenticated()?;
        let remote_root = self.resolve_remote(remote_dir).await?;
        if !self.is_dir(&remote_root).await {
            return Err(FtpError::not_found(format!("Remote directory {} does not exist", remote_root)));
        }

        let base = self.remote.basename(&remote_root).to_string();
        let local_root = if base.is_empty() {
            local_dir.as_ref().to_path_buf()
        } else {
            local_dir.as_ref().join(&base)
        };
        ensure_dir(&local_root)?;
        log::debug!("Downloading {} into {}", remote_root, local_root.display());

        let mut report = MirrorReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pending: Vec<(String, PathBuf)> = vec![(remote_root, local_root)];

        while let Some((remote, local)) = pending.pop() {
            if !visited.insert(remote.clone()) {
                continue;
            }
            let lines = match self.rawlist(&remote).await {
                Ok(lines) => lines,
                Err(e) => {
                    log::warn!("Cannot list {}: {}", remote, e);
                    report.failed.push(remote);
                    continue;
                }
            };

            for entry in parser::parse_listing(&remote, &lines, &self.remote) {
                let local_child = local.join(&entry.name);
                // Directory links may point back up the tree.
                if entry.kind == EntryKind::Link && self.is_dir(&entry.real_path).await {
                    log::debug!("Not following directory link {}", entry.real_path);
                    continue;
                }
                match entry.kind {
                    EntryKind::Directory => match ensure_dir(&local_child) {
                        Ok(()) => pending.push((entry.real_path, local_child)),
                        Err(e) => {
                            log::warn!("Cannot create {}: {}", local_child.display(), e);
                            report.failed.push(entry.real_path);
                        }
                    },
                    _ => {
                        report.attempted += 1;
                        match self.get(&entry.real_path, &local_child).await {
                            Ok(_) => report.succeeded += 1,
                            Err(e) => {
                                log::warn!("Download of {} failed: {}", entry.real_path, e);
                                report.failed.push(entry.real_path);
                            }
                        }
                    }
                }
            }
        }

        log::info!(
            "Downloaded {}/{} files ({} failures)",
            report.succeeded,
            report.attempted,
            report.failed.len()
        );
        Ok(report)
    }

    /// Mirror the local directory `local_dir` into the remote `remote_dir`.
    pub async fn upload_dir(&mut self, local_dir: impl AsRef<Path>, remote_dir: &str) -> FtpResult<MirrorReport> {
        self.ensure_authenticated()?;
        let local_root = local_dir.as_ref();
        let items = scan_dir_recursively(local_root)?;

        let parent = self.resolve_remote(remote_dir).await?;
        let remote_root = match local_root.file_name() {
            Some(name) => self.remote.join(&parent, &name.to_string_lossy()),
            None => parent,
        };
        if !self.is_dir(&remote_root).await {
            self.make_dir(&remote_root, true).await?;
        }
        log::debug!("Uploading {} into {}", local_root.display(), remote_root);

        let mut report = MirrorReport::default();
        // Local directories that could not be created remotely.
        let mut skipped: Vec<PathBuf> = Vec::new();

        for item in items {
            let Ok(relative) = item.strip_prefix(local_root) else {
                continue;
            };
            let remote_path = relative
                .components()
                .fold(remote_root.clone(), |acc, part| {
                    self.remote.join(&acc, &part.as_os_str().to_string_lossy())
                });

            if item.is_dir() {
                if skipped.iter().any(|s| item.starts_with(s)) {
                    continue;
                }
                if !self.is_dir(&remote_path).await {
                    if let Err(e) = self.mkdir(&remote_path).await {
                        log::warn!("Cannot create remote directory {}: {}", remote_path, e);
                        report.failed.push(item.display().to_string());
                        skipped.push(item);
                    }
                }
                continue;
            }

            report.attempted += 1;
            if skipped.iter().any(|s| item.starts_with(s)) {
                report.failed.push(item.display().to_string());
                continue;
            }
            match self.put(&item, &remote_path).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    log::warn!("Upload of {} failed: {}", item.display(), e);
                    report.failed.push(item.display().to_string());
                }
            }
        }

        log::info!(
            "Uploaded {}/{} files ({} failures)",
            report.succeeded,
            report.attempted,
            report.failed.len()
        );
        Ok(report)
    }
}
