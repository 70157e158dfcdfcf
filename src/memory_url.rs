//! Parses `memory://` URLs, the addressing scheme used to refer to a
//! single entity, a wildcard pattern over several, or a relation
//! traversal. Shares the wildcard segment-matching idiom of
//! [`crate::resolver::ResolverIndex`], but — unlike relation resolution,
//! which must collapse to one target or stay unresolved — a memory URL
//! lookup enumerates every match, since listing a folder is a normal,
//! unambiguous operation here.

use std::fmt;

use crate::model::Entity;
use crate::validation::normalize_relation_type;

pub const SCHEME: &str = "memory://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryUrlError {
    MissingScheme,
    Empty,
    DoubleSlash,
    Whitespace,
}

impl fmt::Display for MemoryUrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryUrlError::MissingScheme => write!(f, "memory URL must start with '{SCHEME}'"),
            MemoryUrlError::Empty => write!(f, "memory URL path cannot be empty"),
            MemoryUrlError::DoubleSlash => write!(f, "memory URL path cannot contain '//'"),
            MemoryUrlError::Whitespace => write!(f, "memory URL path cannot contain whitespace"),
        }
    }
}

impl std::error::Error for MemoryUrlError {}

/// A parsed `memory://[project/]path-or-permalink-or-pattern`. `project`
/// is populated only when the first segment names a project the caller
/// passed in as known; otherwise the whole path is kept as `segments`
/// and the lookup is resolved against whatever project is already in
/// scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryUrl {
    pub project: Option<String>,
    pub segments: Vec<String>,
}

impl MemoryUrl {
    /// `known_projects` disambiguates `memory://work/notes/x` (a path
    /// into the default project's `work` folder) from
    /// `memory://work/x` (project `work`, path `x`) — without a project
    /// registry, the first segment is always treated as part of the path.
    pub fn parse(url: &str, known_projects: &[String]) -> Result<Self, MemoryUrlError> {
        let rest = url.strip_prefix(SCHEME).ok_or(MemoryUrlError::MissingScheme)?;
        if rest.is_empty() {
            return Err(MemoryUrlError::Empty);
        }
        if rest.contains(' ') || rest.contains('\t') {
            return Err(MemoryUrlError::Whitespace);
        }
        if rest.contains("//") {
            return Err(MemoryUrlError::DoubleSlash);
        }

        let mut segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        let project = if !segments.is_empty() && known_projects.contains(&segments[0]) {
            Some(segments.remove(0))
        } else {
            None
        };
        if segments.is_empty() {
            return Err(MemoryUrlError::Empty);
        }

        Ok(Self { project, segments })
    }

    pub fn is_pattern(&self) -> bool {
        self.segments.iter().any(|s| s.contains('*'))
    }

    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// Interprets this URL as a `source/rel-type/target` relation
    /// traversal — valid only for exactly three non-wildcard segments.
    /// Left to the caller to invoke: a three-segment path is just as
    /// often a deep folder path, and nothing in the URL itself
    /// disambiguates the two without knowing which operation asked.
    pub fn as_traversal(&self) -> Option<(String, String, String)> {
        if self.segments.len() != 3 || self.is_pattern() {
            return None;
        }
        Some((
            self.segments[0].clone(),
            normalize_relation_type(&self.segments[1]),
            self.segments[2].clone(),
        ))
    }

    /// Matches a permalink against this URL's segments: `*` matches any
    /// single segment, segment count must match exactly. Used for
    /// `folder/*` (enumerate) and `folder/*/impl` (suffix filter) style
    /// patterns.
    pub fn matches_permalink(&self, permalink: &str) -> bool {
        let perm_segs: Vec<&str> = permalink.split('/').collect();
        perm_segs.len() == self.segments.len()
            && perm_segs.iter().zip(self.segments.iter()).all(|(p, s)| s == "*" || p == s)
    }

    /// Enumerates every entity in `entities` whose permalink matches
    /// this URL (exact path: at most one; pattern: zero or more).
    pub fn enumerate<'a>(&self, entities: &'a [Entity]) -> Vec<&'a Entity> {
        let path = self.path();
        entities
            .iter()
            .filter(|e| {
                if self.is_pattern() {
                    self.matches_permalink(&e.permalink)
                } else {
                    e.permalink == path || e.file_path == path || e.file_path == format!("{path}.md")
                }
            })
            .collect()
    }
}
