//! ReDoS-hardened pattern matching shared by every regex-driven validator.
//!
//! Patterns are rejected before compilation when they exceed the configured
//! length or contain a nested-quantifier shape such as `(.*)+` or `(a+)+`.
//! Each execution is timed; slow matches are logged, never failed.

use crate::core::codes;
use crate::core::config::PatternConfig;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::{Duration, Instant};
use tracing::warn;

/// A quantified group whose body itself ends in a quantifier: `(x+)+`, `(.*)*`, `(a+){2,}`.
static NESTED_QUANTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((?:[^()\\]|\\.)*[+*]\??\)\s*[+*{]").unwrap());

/// Quantified two-branch alternation; flagged when one branch prefixes the
/// other, as in `(a|aa)+`.
static QUANTIFIED_ALTERNATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()|]+)\|([^()|]+)\)[+*]").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternRejection {
    TooLong { len: usize, max: usize },
    Catastrophic { shape: String },
    Invalid { message: String },
}

impl PatternRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Catastrophic { .. } => codes::SEC002_SANDBOX_VIOLATION,
            Self::TooLong { .. } | Self::Invalid { .. } => codes::S003_INVALID_CONSTRAINT,
        }
    }
}

impl std::fmt::Display for PatternRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong { len, max } => {
                write!(f, "pattern is {} characters long (limit {})", len, max)
            }
            Self::Catastrophic { shape } => {
                write!(f, "pattern contains catastrophic-backtracking shape '{}'", shape)
            }
            Self::Invalid { message } => write!(f, "invalid regex: {}", message),
        }
    }
}

type Compiled = Result<Arc<Regex>, PatternRejection>;

/// Compiled-pattern memo shared by all validators for one run.
pub struct PatternMatcher {
    max_length: usize,
    slow_threshold: Duration,
    compiled: RwLock<FxHashMap<String, Compiled>>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(&PatternConfig::default())
    }
}

impl PatternMatcher {
    pub fn new(config: &PatternConfig) -> Self {
        Self {
            max_length: config.max_length,
            slow_threshold: Duration::from_millis(config.slow_match_ms),
            compiled: RwLock::new(FxHashMap::default()),
        }
    }

    /// Rejection check without compiling.
    pub fn screen(&self, pattern: &str) -> Result<(), PatternRejection> {
        if pattern.len() > self.max_length {
            return Err(PatternRejection::TooLong {
                len: pattern.len(),
                max: self.max_length,
            });
        }
        if let Some(m) = NESTED_QUANTIFIER.find(pattern) {
            return Err(PatternRejection::Catastrophic {
                shape: m.as_str().to_string(),
            });
        }
        for caps in QUANTIFIED_ALTERNATION.captures_iter(pattern) {
            let (a, b) = (&caps[1], &caps[2]);
            if a.starts_with(b) || b.starts_with(a) {
                return Err(PatternRejection::Catastrophic {
                    shape: caps[0].to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn compile(&self, pattern: &str) -> Compiled {
        if let Ok(cache) = self.compiled.read()
            && let Some(hit) = cache.get(pattern)
        {
            return hit.clone();
        }
        let compiled = self.screen(pattern).and_then(|_| {
            Regex::new(pattern)
                .map(Arc::new)
                .map_err(|e| PatternRejection::Invalid {
                    message: e.to_string(),
                })
        });
        if let Ok(mut cache) = self.compiled.write() {
            return cache
                .entry(pattern.to_string())
                .or_insert(compiled)
                .clone();
        }
        compiled
    }

    pub fn is_match(&self, pattern: &str, text: &str) -> Result<bool, PatternRejection> {
        let regex = self.compile(pattern)?;
        Ok(self.timed(pattern, || regex.is_match(text)))
    }

    /// 1-based line of the first match, if any.
    pub fn find_line(&self, pattern: &str, text: &str) -> Result<Option<usize>, PatternRejection> {
        let regex = self.compile(pattern)?;
        let found = self.timed(pattern, || regex.find(text).map(|m| m.start()));
        Ok(found.map(|offset| line_of_offset(text, offset)))
    }

    /// First capture group (or whole match) of every match.
    pub fn captures(&self, pattern: &str, text: &str) -> Result<Vec<String>, PatternRejection> {
        let regex = self.compile(pattern)?;
        Ok(self.timed(pattern, || {
            regex
                .captures_iter(text)
                .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| m.as_str().to_string())
                .collect()
        }))
    }

    fn timed<T>(&self, pattern: &str, run: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = run();
        let elapsed = started.elapsed();
        if elapsed > self.slow_threshold {
            warn!(
                pattern,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow pattern match"
            );
        }
        out
    }
}

pub fn line_of_offset(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

/// Path glob: `*` matches within one segment, `**` across segments, `?` one
/// character.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    glob_with(pattern, text, '/')
}

/// Call-name glob: like [`glob_match`] with `.` as the segment separator, so
/// `api.*` matches `api.get` but not `api.client.get`.
pub fn call_glob_match(pattern: &str, text: &str) -> bool {
    glob_with(pattern, text, '.')
}

fn glob_with(pattern: &str, text: &str, sep: char) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_from(&p, &t, sep)
}

fn glob_from(p: &[char], t: &[char], sep: char) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') if p.get(1) == Some(&'*') => {
            let rest = &p[2..];
            if rest.is_empty() {
                return true;
            }
            // `**/x` also matches `x` at the top level.
            if rest[0] == sep && glob_from(&rest[1..], t, sep) {
                return true;
            }
            (0..=t.len()).any(|i| glob_from(rest, &t[i..], sep))
        }
        Some('*') => {
            let rest = &p[1..];
            for i in 0..=t.len() {
                if glob_from(rest, &t[i..], sep) {
                    return true;
                }
                if i < t.len() && t[i] == sep {
                    break;
                }
            }
            false
        }
        Some('?') => !t.is_empty() && t[0] != sep && glob_from(&p[1..], &t[1..], sep),
        Some(c) => t.first() == Some(c) && glob_from(&p[1..], &t[1..], sep),
    }
}

/// Call names: literals match exactly, anything with a wildcard is a glob.
pub fn name_matches(pattern: &str, name: &str) -> bool {
    if pattern.contains('*') || pattern.contains('?') {
        call_glob_match(pattern, name)
    } else {
        pattern == name
    }
}
