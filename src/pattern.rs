// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Inclusion and exclusion pattern matching.
//!
//! Patterns are matched against paths relative to a project root, always
//! rendered with `/` separators. An inclusion pattern is either an exact
//! literal path, or a glob where `*` stays inside one path segment and `**`
//! spans any number of directories. Exclusion patterns match either the
//! whole relative path, or any single segment of it, so excluding
//! "node_modules" drops it at every depth.

use glob::{MatchOptions, Pattern};

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled set of inclusion and exclusion patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    include: Vec<Rule>,
    exclude: Vec<Rule>,
}

impl PatternSet {
    /// Compile inclusion and exclusion patterns.
    ///
    /// Patterns that fail to parse as globs are kept as plain literals.
    pub fn new(
        include: impl IntoIterator<Item = impl AsRef<str>>,
        exclude: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            include: include.into_iter().map(|p| Rule::new(p.as_ref())).collect(),
            exclude: exclude.into_iter().map(|p| Rule::new(p.as_ref())).collect(),
        }
    }

    /// Path is included by at least one rule, and not excluded by any.
    pub fn matches(&self, relative_path: &str) -> bool {
        self.is_included(relative_path) && !self.is_excluded(relative_path)
    }

    /// Path matches at least one inclusion rule.
    pub fn is_included(&self, relative_path: &str) -> bool {
        self.include.iter().any(|rule| rule.matches(relative_path))
    }

    /// Path, or any one of its segments, matches an exclusion rule.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.exclude.iter().any(|rule| {
            rule.matches(relative_path)
                || relative_path
                    .split('/')
                    .filter(|segment| !segment.is_empty())
                    .any(|segment| rule.matches(segment))
        })
    }

    /// Single path segment matches an exclusion rule.
    ///
    /// Used to prune directories during a walk without descending into them.
    pub fn excludes_segment(&self, segment: &str) -> bool {
        self.exclude.iter().any(|rule| rule.matches(segment))
    }

    /// Inclusion rules that are exact literal paths.
    pub fn literals(&self) -> impl Iterator<Item = &str> {
        self.include.iter().filter_map(|rule| match rule {
            Rule::Literal(literal) => Some(literal.as_str()),
            Rule::Glob(..) => None,
        })
    }

    /// At least one inclusion rule needs a directory walk.
    pub fn needs_walk(&self) -> bool {
        self.include.iter().any(|rule| matches!(rule, Rule::Glob(..)))
    }
}

/// One-shot form of [`PatternSet::matches`].
pub fn matches(
    relative_path: &str,
    include: impl IntoIterator<Item = impl AsRef<str>>,
    exclude: impl IntoIterator<Item = impl AsRef<str>>,
) -> bool {
    PatternSet::new(include, exclude).matches(relative_path)
}

#[derive(Debug, Clone)]
enum Rule {
    Literal(String),
    Glob(String, Pattern),
}

impl Rule {
    fn new(raw: &str) -> Self {
        let raw = raw.trim_start_matches("./").trim_end_matches('/');
        if !raw.contains(['*', '?', '[']) {
            return Self::Literal(raw.to_string());
        }

        match Pattern::new(raw) {
            Ok(pattern) => Self::Glob(raw.to_string(), pattern),
            Err(_) => Self::Literal(raw.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == path,
            Self::Glob(raw, pattern) => raw == path || pattern.matches_with(path, OPTIONS),
        }
    }
}
