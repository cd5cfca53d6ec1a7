//! User-specified rules.
//!
//! Directives come from profiles and the command line as
//! `landlock.<kind> <path>` lines. They are parsed into [`Directive`] when
//! the list is built, so the kind is always one of the four access classes
//! by the time rules are registered.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::access::AccessClass;
use crate::error::{LandlockError, Result};

/// Prefix shared by every directive keyword.
pub const DIRECTIVE_PREFIX: &str = "landlock.";

/// One `(access class, path)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub class: AccessClass,
    pub path: PathBuf,
}

impl Directive {
    pub fn new(class: AccessClass, path: impl Into<PathBuf>) -> Self {
        Self {
            class,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class, self.path.display())
    }
}

impl FromStr for Directive {
    type Err = LandlockError;

    /// Parse `landlock.<kind> <path>`. The path runs to the end of the line
    /// and may contain spaces.
    fn from_str(s: &str) -> Result<Self> {
        let line = s.trim();
        let (keyword, path) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| LandlockError::InvalidDirective(format!("missing path in {line:?}")))?;
        let class = keyword.parse::<AccessClass>()?;
        let path = path.trim();
        if path.is_empty() {
            return Err(LandlockError::InvalidDirective(format!(
                "missing path in {line:?}"
            )));
        }
        Ok(Self::new(class, path))
    }
}

/// Ordered directives, traversed oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectiveList {
    entries: Vec<Directive>,
}

impl DirectiveList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, directive: Directive) {
        self.entries.push(directive);
    }

    /// Parse and append one textual directive.
    pub fn push_str(&mut self, line: &str) -> Result<()> {
        self.push(line.parse()?);
        Ok(())
    }

    /// Append the `landlock.*` lines of a profile, in file order.
    ///
    /// Blank lines, `#` comments and lines for other profile options are
    /// skipped. A line that starts with the directive prefix but names an
    /// unknown kind is an error, and nothing from the profile is appended.
    pub fn extend_from_profile(&mut self, profile: &str) -> Result<usize> {
        let mut parsed = Vec::new();
        for (lineno, line) in profile.lines().enumerate() {
            let line = line.trim();
            if !line.starts_with(DIRECTIVE_PREFIX) {
                continue;
            }
            let directive = line.parse::<Directive>().map_err(|e| match e {
                LandlockError::InvalidDirective(msg) => {
                    LandlockError::InvalidDirective(format!("line {}: {msg}", lineno + 1))
                }
                other => other,
            })?;
            parsed.push(directive);
        }
        let count = parsed.len();
        self.entries.extend(parsed);
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.entries.iter()
    }
}

impl From<Vec<Directive>> for DirectiveList {
    fn from(entries: Vec<Directive>) -> Self {
        Self { entries }
    }
}

impl FromIterator<Directive> for DirectiveList {
    fn from_iter<I: IntoIterator<Item = Directive>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<Directive> for DirectiveList {
    fn extend<I: IntoIterator<Item = Directive>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for DirectiveList {
    type Item = Directive;
    type IntoIter = std::vec::IntoIter<Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a DirectiveList {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
