//! Remote tree operations: listing, probing, cleaning and sizing.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::parser;
use crate::ftp::session::FtpSession;
use crate::ftp::types::{ListOptions, RawReply, RemoteListing};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref REPLY_LINE_RE: Regex = Regex::new(r"^(\d{3})[ -]?(.*)$").expect("valid reply pattern");
}

impl FtpSession {
    /// Resolve `path` against the server working directory into an arranged
    /// absolute remote path.
    pub(crate) async fn resolve_remote(&mut self, path: &str) -> FtpResult<String> {
        let converted = self.remote.convert(path);
        let sep = self.remote.separator();
        if converted.starts_with(sep) {
            return Ok(self.remote.arrange(&converted, false));
        }
        let pwd = self.pwd().await?;
        let cwd = self.remote.convert(&pwd);
        if converted.is_empty() || converted == "." {
            return Ok(self.remote.insert(&self.remote.arrange(&cwd, false), false));
        }
        let joined = self.remote.join(&cwd, &converted);
        Ok(self.remote.insert(&joined, false))
    }

    /// Move the working directory out of `dir` if it currently lies inside.
    async fn leave_subtree(&mut self, dir: &str) -> FtpResult<()> {
        let pwd = self.pwd().await?;
        let cwd = self.remote.convert(&pwd);
        if self.remote.is_within(&cwd, dir) {
            let parent = self.remote.parent(dir);
            log::debug!("Leaving {} for {} before removal", cwd, parent);
            self.chdir(&parent).await?;
        }
        Ok(())
    }

    // ─── Listing ─────────────────────────────────────────────────

    /// List `dir`, keyed and ordered by entry key.
    ///
    /// Recursive listings descend into every directory entry (hidden ones
    /// included); the hidden and glob filters run on basenames once the
    /// whole walk is done.
    pub async fn list(&mut self, dir: &str, options: &ListOptions) -> FtpResult<RemoteListing> {
        self.ensure_authenticated()?;
        let pattern = options
            .filter
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| FtpError::invalid_config(format!("Invalid list filter: {}", e)))?;

        let root = self.resolve_remote(dir).await?;
        let mut entries = Vec::new();
        let mut pending = vec![root.clone()];
        let mut visited = HashSet::new();

        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let lines = match self.rawlist(&current).await {
                Ok(lines) => lines,
                Err(e) if current == root => return Err(e),
                Err(e) => {
                    log::warn!("Skipping unreadable directory {}: {}", current, e);
                    continue;
                }
            };
            let parsed = parser::parse_listing(&current, &lines, &self.remote);
            log::debug!("Listed {} ({} entries)", current, parsed.len());
            if options.recursive {
                pending.extend(parsed.iter().filter(|e| e.is_dir()).map(|e| e.real_path.clone()));
            }
            entries.extend(parsed);
        }

        let kept = entries.into_iter().filter(|entry| {
            (options.show_hidden || !entry.is_hidden())
                && pattern.as_ref().map_or(true, |p| p.matches(&entry.name))
        });
        Ok(RemoteListing::from_entries(kept, options.order))
    }

    /// Number of entries `list` would return.
    pub async fn count_items(&mut self, dir: &str, recursive: bool, show_hidden: bool) -> FtpResult<usize> {
        let options = ListOptions::default().recursive(recursive).show_hidden(show_hidden);
        Ok(self.list(dir, &options).await?.len())
    }

    // ─── Predicates ──────────────────────────────────────────────

    /// Check by changing into `path` and back to the prior directory.
    pub async fn is_dir(&mut self, path: &str) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        let Ok(prior) = self.pwd().await else {
            return false;
        };
        if self.chdir(path).await.is_err() {
            return false;
        }
        if let Err(e) = self.chdir(&prior).await {
            log::warn!("Could not return to {} after probing {}: {}", prior, path, e);
        }
        true
    }

    /// A path is a file when the server reports a size for it.
    pub async fn is_file(&mut self, path: &str) -> bool {
        self.is_authenticated() && self.size(path).await.is_ok()
    }

    pub async fn is_dir_empty(&mut self, dir: &str) -> FtpResult<bool> {
        Ok(self.count_items(dir, false, true).await? < 1)
    }

    // ─── Removal ─────────────────────────────────────────────────

    /// Remove everything below `dir`, keeping `dir` itself.
    ///
    /// Files go first, then directories deepest-first. Individual failures
    /// are logged and skipped; the result says whether `dir` ended up empty.
    pub async fn clean_dir(&mut self, dir: &str) -> FtpResult<bool> {
        self.ensure_authenticated()?;
        let root = self.resolve_remote(dir).await?;
        let listing = self
            .list(&root, &ListOptions::default().recursive(true).show_hidden(true))
            .await?;

        let (mut dirs, others): (Vec<_>, Vec<_>) = listing.into_iter().partition(|e| e.is_dir());
        for entry in &others {
            if let Err(e) = self.delete(&entry.real_path).await {
                log::warn!("Could not delete {}: {}", entry.real_path, e);
            }
        }

        let sep = self.remote.separator();
        dirs.sort_by_key(|e| std::cmp::Reverse(e.real_path.matches(sep).count()));
        for entry in &dirs {
            if let Err(e) = self.leave_subtree(&entry.real_path).await {
                log::warn!("Could not leave {}: {}", entry.real_path, e);
            }
            if let Err(e) = self.rmdir(&entry.real_path).await {
                log::warn!("Could not remove directory {}: {}", entry.real_path, e);
            }
        }

        self.is_dir_empty(&root).await
    }

    /// `clean_dir` followed by removing `dir` itself.
    pub async fn delete_dir(&mut self, dir: &str) -> FtpResult<()> {
        self.ensure_authenticated()?;
        let root = self.resolve_remote(dir).await?;
        if !self.clean_dir(&root).await? {
            log::warn!("{} is not empty after cleaning", root);
        }
        self.leave_subtree(&root).await?;
        self.rmdir(&root).await?;
        log::debug!("Deleted directory tree {}", root);
        Ok(())
    }

    /// Delete a file, or a directory (its whole tree with `recursive`).
    pub async fn remove(&mut self, path: &str, recursive: bool) -> FtpResult<()> {
        self.ensure_authenticated()?;
        if self.is_dir(path).await {
            if recursive {
                self.delete_dir(path).await
            } else {
                let target = self.resolve_remote(path).await?;
                self.leave_subtree(&target).await?;
                self.rmdir(&target).await
            }
        } else {
            self.delete(path).await
        }
    }

    /// Create `dir`, and with `recursive` every missing parent first.
    /// Returns the arranged absolute path.
    pub async fn make_dir(&mut self, dir: &str, recursive: bool) -> FtpResult<String> {
        self.ensure_authenticated()?;
        let target = self.resolve_remote(dir).await?;
        if !recursive {
            self.mkdir(&target).await?;
            return Ok(target);
        }

        let sep = self.remote.separator();
        let mut current = String::new();
        for segment in target.split(sep).filter(|s| !s.is_empty()) {
            current.push(sep);
            current.push_str(segment);
            if !self.is_dir(&current).await {
                self.mkdir(&current).await?;
            }
        }
        Ok(target)
    }

    // ─── Sizes and metadata ──────────────────────────────────────

    /// Sum of the sizes of every non-directory entry below `dir`.
    pub async fn dir_size(&mut self, dir: &str) -> FtpResult<u64> {
        let options = ListOptions::default().recursive(true).show_hidden(true);
        let listing = self.list(dir, &options).await?;
        Ok(listing.iter().filter(|e| !e.is_dir()).map(|e| e.size_bytes).sum())
    }

    pub async fn modified_time(&mut self, path: &str) -> FtpResult<DateTime<Utc>> {
        self.ensure_authenticated()?;
        self.mdtm(path).await
    }

    /// Change to the parent directory.
    pub async fn up(&mut self) -> FtpResult<()> {
        self.ensure_authenticated()?;
        self.cdup().await
    }

    // ─── Raw commands ────────────────────────────────────────────

    /// Send any command and split the reply into code, messages and body.
    pub async fn raw_command(&mut self, command: &str) -> FtpResult<RawReply> {
        self.ensure_authenticated()?;
        let response = self.raw(command.trim()).await?;
        Ok(split_reply(response.code, response.lines))
    }

    /// Server `HELP` text.
    pub async fn help(&mut self) -> FtpResult<RawReply> {
        self.raw_command("HELP").await
    }
}

/// Decompose reply lines; the code on the first line wins over `fallback`.
pub fn split_reply(fallback: u16, lines: Vec<String>) -> RawReply {
    let parse = |line: &str| -> (Option<u16>, String) {
        match REPLY_LINE_RE.captures(line) {
            Some(caps) => (caps[1].parse().ok(), caps[2].trim().to_string()),
            None => (None, line.trim().to_string()),
        }
    };
    let (first_code, message) = lines.first().map(|l| parse(l)).unwrap_or((None, String::new()));
    let end_message = lines.last().map(|l| parse(l).1).unwrap_or_default();
    let body = if lines.len() > 2 { lines[1..lines.len() - 1].to_vec() } else { Vec::new() };
    let code = first_code.unwrap_or(fallback);
    RawReply {
        code,
        message,
        body,
        end_message,
        success: code < 400,
        lines,
    }
}
