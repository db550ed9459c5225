//! Search filters for metadata-based filtering
//!
//! Narrows search hits by language and path patterns before deduplication.

use crate::error::Result;
use crate::store::SearchHit;
use regex::Regex;

/// Search filter criteria
#[derive(Debug, Clone, Default)]
pub struct HitFilter {
    /// Keep only these languages (e.g., ["rust", "go"])
    languages: Option<Vec<String>>,
    /// Keep only paths matching this pattern
    path_pattern: Option<Regex>,
    /// Drop paths matching this pattern
    exclude_pattern: Option<Regex>,
}

impl HitFilter {
    /// Create a filter that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Set languages filter
    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = Some(languages.into_iter().map(|l| l.to_lowercase()).collect());
        self
    }

    /// Set path pattern filter; fails on an invalid regex
    pub fn with_path_pattern(mut self, pattern: &str) -> Result<Self> {
        self.path_pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Set exclude pattern filter; fails on an invalid regex
    pub fn with_exclude_pattern(mut self, pattern: &str) -> Result<Self> {
        self.exclude_pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Check if a hit matches the filter criteria
    pub fn matches(&self, hit: &SearchHit) -> bool {
        if let Some(ref languages) = self.languages {
            if !languages.contains(&hit.language.to_lowercase()) {
                return false;
            }
        }

        if let Some(ref regex) = self.path_pattern {
            if !regex.is_match(&hit.file_path) {
                return false;
            }
        }

        if let Some(ref regex) = self.exclude_pattern {
            if regex.is_match(&hit.file_path) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_hit(file_path: &str, language: &str) -> SearchHit {
        SearchHit {
            id: 0,
            score: 0.8,
            file_path: file_path.to_string(),
            content: "test content".to_string(),
            start_line: 1,
            end_line: 1,
            language: language.to_string(),
        }
    }

    #[test]
    fn test_empty_filter_accepts_all() {
        assert!(HitFilter::new().matches(&create_test_hit("any.txt", "unknown")));
    }

    #[test]
    fn test_language_filter() {
        let filter = HitFilter::new().with_languages(vec!["Rust".to_string()]);

        assert!(filter.matches(&create_test_hit("src/main.rs", "rust")));
        assert!(!filter.matches(&create_test_hit("app.py", "python")));
    }

    #[test]
    fn test_path_patterns() {
        let filter = HitFilter::new()
            .with_path_pattern("src/.*")
            .unwrap()
            .with_exclude_pattern("_test\\.go$")
            .unwrap();

        assert!(filter.matches(&create_test_hit("src/main.go", "go")));
        assert!(!filter.matches(&create_test_hit("src/main_test.go", "go")));
        assert!(!filter.matches(&create_test_hit("docs/readme.md", "markdown")));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(HitFilter::new().with_path_pattern("(unclosed").is_err());
    }
}
