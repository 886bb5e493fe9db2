//! Path-separator normalisation for local and remote paths.
//!
//! One algorithm, parameterised by the canonical separator. A session keeps
//! one instance for the local OS and one for the detected remote system.

use crate::ftp::types::RemoteSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNormalizer {
    separator: char,
    /// Extra sequence rewritten to `separator` by [`convert`](Self::convert).
    foreign: Option<String>,
}

impl PathNormalizer {
    /// Normaliser for `separator`; the opposite slash is treated as foreign.
    pub fn new(separator: char) -> Self {
        let foreign = match separator {
            '\\' => Some("/".to_string()),
            _ => None,
        };
        Self { separator, foreign }
    }

    /// Normaliser bound to the local OS separator.
    pub fn local() -> Self {
        Self::new(std::path::MAIN_SEPARATOR)
    }

    pub fn for_system(system: RemoteSystem) -> Self {
        Self::new(system.separator())
    }

    /// Replace the default foreign sequence.
    pub fn with_foreign(mut self, sequence: impl Into<String>) -> Self {
        let sequence = sequence.into();
        self.foreign = if sequence.is_empty() { None } else { Some(sequence) };
        self
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Rewrite `\` and the foreign sequence to the canonical separator.
    pub fn convert(&self, path: &str) -> String {
        let sep = self.separator.to_string();
        let mut out = path.replace('\\', &sep);
        if let Some(foreign) = &self.foreign {
            out = out.replace(foreign.as_str(), &sep);
        }
        out
    }

    /// Collapse repeated separators and strip trailing ones.
    ///
    /// A leading separator is kept so absolute paths stay absolute. With
    /// `close_edges` the result starts and ends with the separator.
    pub fn arrange(&self, path: &str, close_edges: bool) -> String {
        let sep = self.separator;
        let absolute = path.starts_with(sep);
        let joined = path
            .split(sep)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(&sep.to_string());

        let mut out = String::with_capacity(joined.len() + 2);
        if absolute || close_edges {
            out.push(sep);
        }
        out.push_str(&joined);
        if close_edges && !joined.is_empty() {
            out.push(sep);
        }
        out
    }

    /// Ensure exactly one separator at the start (or the end with `to_end`).
    pub fn insert(&self, path: &str, to_end: bool) -> String {
        let sep = self.separator;
        if to_end {
            format!("{}{}", path.trim_end_matches(sep), sep)
        } else {
            format!("{}{}", sep, path.trim_start_matches(sep))
        }
    }

    /// `arrange(base + sep + child)`.
    pub fn join(&self, base: &str, child: &str) -> String {
        self.arrange(&format!("{}{}{}", base, self.separator, child), false)
    }

    /// Last non-empty segment, or an empty string for the root.
    pub fn basename<'a>(&self, path: &'a str) -> &'a str {
        path.split(self.separator)
            .filter(|segment| !segment.is_empty())
            .last()
            .unwrap_or("")
    }

    /// Parent directory of `path`; the root is its own parent.
    pub fn parent(&self, path: &str) -> String {
        let arranged = self.arrange(path, false);
        match arranged.rfind(self.separator) {
            Some(0) => self.separator.to_string(),
            Some(idx) => arranged[..idx].to_string(),
            None => String::new(),
        }
    }

    /// Whether `path` equals `ancestor` or lies below it.
    pub fn is_within(&self, path: &str, ancestor: &str) -> bool {
        let path = self.arrange(path, false);
        let ancestor = self.arrange(ancestor, false);
        if path == ancestor {
            return true;
        }
        let prefix = self.insert(&ancestor, true);
        path.starts_with(&prefix)
    }
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self::new('/')
    }
}
