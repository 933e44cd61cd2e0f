//! A [`PathsProvider`] abstraction and its glob-based implementation,
//! generalized from the teacher's `paths_provider.rs` (which hardcodes
//! a single include/exclude pattern pair) to the engine's per-config
//! watch set.

use std::path::PathBuf;

pub use glob::MatchOptions;
use glob::Pattern;

/// Enumerates the paths a watch configuration currently resolves to.
/// An `IntoIterator` associated type stands in for a borrowed iterator
/// (unavailable without GATs at the time the teacher wrote this trait),
/// matching `file-source`'s own workaround.
pub trait PathsProvider {
    type IntoIter: IntoIterator<Item = PathBuf>;

    fn paths(&self) -> Self::IntoIter;
}

/// A glob-based provider over one config's include/exclude pattern set.
pub struct Glob {
    include_patterns: Vec<String>,
    exclude_patterns: Vec<Pattern>,
    match_options: MatchOptions,
}

impl Glob {
    pub fn new(include_patterns: &[PathBuf], exclude_patterns: &[PathBuf], match_options: MatchOptions) -> Option<Self> {
        let include_patterns = include_patterns
            .iter()
            .map(|p| p.to_str().map(ToOwned::to_owned))
            .collect::<Option<_>>()?;
        let exclude_patterns = exclude_patterns
            .iter()
            .filter_map(|p| p.to_str().map(|s| Pattern::new(s).ok()))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            include_patterns,
            exclude_patterns,
            match_options,
        })
    }
}

impl PathsProvider for Glob {
    type IntoIter = Vec<PathBuf>;

    fn paths(&self) -> Self::IntoIter {
        self.include_patterns
            .iter()
            .flat_map(|pattern| {
                glob::glob_with(pattern, self.match_options)
                    .into_iter()
                    .flatten()
                    .filter_map(Result::ok)
            })
            .filter(|candidate| {
                let candidate_str = candidate.to_string_lossy();
                !self.exclude_patterns.iter().any(|p| p.matches(&candidate_str))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_take_precedence_over_includes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.log"), b"").unwrap();
        std::fs::write(dir.path().join("skip.log"), b"").unwrap();

        let include = dir.path().join("*.log");
        let exclude = dir.path().join("skip.log");
        let provider = Glob::new(&[include], &[exclude], MatchOptions::default()).unwrap();

        let found = provider.paths();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("keep.log"));
    }
}
