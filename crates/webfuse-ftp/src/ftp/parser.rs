//! UNIX `LIST` line parser.
//!
//! Lines follow the `ls -l` layout shared by most UNIX-style servers:
//! ```text
//! drwxr-xr-x   2 user group  4096 Jan  1 12:00 dirname
//! -rw-r--r--   1 user group  1234 Jan  1  2025 file.txt
//! lrwxrwxrwx   1 user group    42 Jan  1 12:00 link -> target
//! ```
//! Tokens 0..8 map positionally to permission, link count, owner, group,
//! size, month, day, time and name. DOS-style `dir` listings are not
//! recognised. Rejected lines yield `None`; callers skip them.

use crate::ftp::path::PathNormalizer;
use crate::ftp::types::{EntryKind, RemoteEntry};
use sha2::{Digest, Sha256};
use webfuse_core::format_bytes;

const MIN_TOKENS: usize = 9;
const LINK_ARROW: &str = "->";

/// Parse every line of a raw listing of `base_dir`, skipping rejects.
pub fn parse_listing<I, S>(base_dir: &str, lines: I, paths: &PathNormalizer) -> Vec<RemoteEntry>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_line(base_dir, line.as_ref(), paths))
        .collect()
}

/// Parse one raw listing line of `base_dir`.
pub fn parse_line(base_dir: &str, line: &str, paths: &PathNormalizer) -> Option<RemoteEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return None;
    }

    let permission = tokens[0];
    let kind = entry_kind(permission);

    // Names with spaces were split apart; re-join the trailing tokens with
    // single spaces. Runs of spaces or tabs inside a name are not recoverable.
    let tail = &tokens[MIN_TOKENS - 1..];
    let (name, target) = match kind {
        EntryKind::Link => match tail.iter().position(|t| *t == LINK_ARROW) {
            Some(arrow) => {
                let target = tail[arrow + 1..].join(" ");
                (
                    tail[..arrow].join(" "),
                    if target.is_empty() { None } else { Some(target) },
                )
            }
            None => (tail.join(" "), None),
        },
        _ => (tail.join(" "), None),
    };

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let real_path = paths.join(base_dir, &name);
    let key = entry_key(kind, &real_path);
    let size = tokens[4];
    let size_bytes = size.parse::<u64>().unwrap_or(0);

    Some(RemoteEntry {
        kind,
        name,
        key,
        real_path,
        permission: permission.to_string(),
        octal: octal_permission(permission),
        links: tokens[1].to_string(),
        owner: tokens[2].to_string(),
        group: tokens[3].to_string(),
        size: size.to_string(),
        size_bytes,
        human_size: format_bytes(size_bytes),
        month: tokens[5].to_string(),
        day: tokens[6].to_string(),
        time: tokens[7].to_string(),
        target,
    })
}

/// Stable identity of an entry: hex SHA-256 of `"{kind}#{real_path}"`.
pub fn entry_key(kind: EntryKind, real_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"#");
    hasher.update(real_path.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_numeric(permission: &str) -> bool {
    !permission.is_empty() && permission.bytes().all(|b| b.is_ascii_digit())
}

fn entry_kind(permission: &str) -> EntryKind {
    if is_numeric(permission) {
        return EntryKind::Unknown;
    }
    match permission.as_bytes().first() {
        Some(b'-') => EntryKind::File,
        Some(b'd') => EntryKind::Directory,
        Some(b'l') => EntryKind::Link,
        _ => EntryKind::Unknown,
    }
}

/// `drwxr-xr-x` → `0755`.
///
/// `s`/`t` carry the execute bit, `S`/`T` do not. Numeric or short
/// permission strings have no octal form.
pub fn octal_permission(permission: &str) -> Option<String> {
    if is_numeric(permission) {
        return None;
    }
    let bits: Vec<char> = permission.chars().skip(1).take(9).collect();
    if bits.len() < 9 {
        return None;
    }

    let mut out = String::from("0");
    for triad in bits.chunks(3) {
        let value: u32 = triad
            .iter()
            .map(|c| match c {
                'r' => 4,
                'w' => 2,
                'x' | 's' | 't' => 1,
                _ => 0,
            })
            .sum();
        out.push(char::from_digit(value, 8)?);
    }
    Some(out)
}
