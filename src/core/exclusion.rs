/*!
 * Layered exclusion matching
 *
 * Three layers of compiled patterns decide whether a path is skipped:
 * per-job individual paths beat per-job patterns, which beat the bundled
 * global defaults. Pattern syntax is glob-like: `*` and `?` stop at path
 * separators, `**` crosses them, and a trailing `/` restricts the pattern
 * to directories.
 */

use glob::{MatchOptions, Pattern as GlobPattern};
use serde::Deserialize;
use thiserror::Error;

use crate::core::paths::normalize_separators;
use crate::model::{Exclusion, ExclusionLevel};

/// Bundled global defaults, compiled into the binary
const DEFAULT_EXCLUSIONS_JSON: &str = include_str!("default_exclusions.json");

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Errors that can occur while building a matcher
#[derive(Error, Debug)]
pub enum ExclusionError {
    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("Failed to parse bundled default exclusions: {0}")]
    Defaults(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct DefaultExclusions {
    patterns: Vec<String>,
    extensions: Vec<String>,
}

/// One compiled exclusion pattern
#[derive(Debug, Clone)]
struct CompiledPattern {
    raw: String,
    glob: GlobPattern,
    /// Trailing-`/` patterns only match directories
    dir_only: bool,
    /// Patterns containing `/` match the whole relative path, others the
    /// final component
    full_path: bool,
}

impl CompiledPattern {
    fn compile(pattern: &str) -> Result<Self, ExclusionError> {
        let raw = pattern.to_string();
        let normalized = normalize_separators(pattern);
        let dir_only = normalized.ends_with('/');
        let body = normalized.trim_end_matches('/');
        let glob = GlobPattern::new(body).map_err(|source| ExclusionError::InvalidPattern {
            pattern: raw.clone(),
            source,
        })?;

        Ok(Self {
            raw,
            glob,
            dir_only,
            full_path: body.contains('/'),
        })
    }

    fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let candidate = if self.full_path {
            rel_path
        } else {
            rel_path.rsplit('/').next().unwrap_or(rel_path)
        };
        self.glob.matches_with(candidate, MATCH_OPTIONS)
    }
}

/// The layer and pattern that excluded a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionMatch<'a> {
    pub level: ExclusionLevel,
    pub pattern: &'a str,
}

/// Compiled three-layer exclusion matcher for one job
pub struct ExclusionMatcher {
    global: Vec<CompiledPattern>,
    job: Vec<CompiledPattern>,
    /// Normalized absolute paths excluded individually
    individual: Vec<String>,
}

impl ExclusionMatcher {
    /// Matcher holding only the bundled global defaults
    pub fn with_defaults() -> Result<Self, ExclusionError> {
        let defaults: DefaultExclusions = serde_json::from_str(DEFAULT_EXCLUSIONS_JSON)?;

        let mut global = Vec::with_capacity(defaults.patterns.len() + defaults.extensions.len());
        for pattern in &defaults.patterns {
            global.push(CompiledPattern::compile(pattern)?);
        }
        for ext in &defaults.extensions {
            // extensions ".x" desugar to "*.x"
            global.push(CompiledPattern::compile(&format!("*{ext}"))?);
        }

        Ok(Self {
            global,
            job: Vec::new(),
            individual: Vec::new(),
        })
    }

    /// Empty matcher, excluding nothing
    pub fn empty() -> Self {
        Self {
            global: Vec::new(),
            job: Vec::new(),
            individual: Vec::new(),
        }
    }

    /// Build the matcher for one job from its stored exclusion rows, layered
    /// over the bundled defaults
    pub fn for_job(rows: &[Exclusion]) -> Result<Self, ExclusionError> {
        let mut matcher = Self::with_defaults()?;
        for row in rows {
            match row.level {
                ExclusionLevel::Global => matcher.add_global_pattern(&row.pattern)?,
                ExclusionLevel::Job => matcher.add_job_pattern(&row.pattern)?,
                ExclusionLevel::Individual => matcher.add_individual_path(&row.pattern),
            }
        }
        Ok(matcher)
    }

    pub fn add_global_pattern(&mut self, pattern: &str) -> Result<(), ExclusionError> {
        self.global.push(CompiledPattern::compile(pattern)?);
        Ok(())
    }

    pub fn add_job_pattern(&mut self, pattern: &str) -> Result<(), ExclusionError> {
        self.job.push(CompiledPattern::compile(pattern)?);
        Ok(())
    }

    /// Exclude one absolute path; matched by equality after normalization
    pub fn add_individual_path(&mut self, path: &str) {
        self.individual.push(normalize_separators(path));
    }

    /// First matching exclusion in priority order individual > job > global
    ///
    /// `rel_path` is forward-slashed and relative to the job root;
    /// `abs_path` is the same file's absolute path, used by the individual
    /// layer. Directory hits make the walker skip the whole subtree.
    pub fn decide(&self, rel_path: &str, abs_path: &str, is_dir: bool) -> Option<ExclusionMatch<'_>> {
        let abs_normalized = normalize_separators(abs_path);
        if let Some(hit) = self.individual.iter().find(|p| **p == abs_normalized) {
            return Some(ExclusionMatch {
                level: ExclusionLevel::Individual,
                pattern: hit,
            });
        }

        for (level, layer) in [
            (ExclusionLevel::Job, &self.job),
            (ExclusionLevel::Global, &self.global),
        ] {
            if let Some(hit) = layer.iter().find(|p| p.matches(rel_path, is_dir)) {
                return Some(ExclusionMatch {
                    level,
                    pattern: &hit.raw,
                });
            }
        }
        None
    }

    /// Convenience wrapper when only the yes/no answer matters
    pub fn is_excluded(&self, rel_path: &str, abs_path: &str, is_dir: bool) -> bool {
        self.decide(rel_path, abs_path, is_dir).is_some()
    }
}
