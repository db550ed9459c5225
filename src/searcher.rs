//! Search functionality and result formatting
//!
//! Embeds the query, asks the vector store for neighbours, drops hits the
//! filter rejects, then collapses overlapping ranges of the same file.

use crate::dedup::deduplicate;
use crate::embedder::EmbeddingService;
use crate::error::Result;
use crate::filter::HitFilter;
use crate::store::{CollectionInfo, SearchHit, VectorStore};
use colored::*;
use std::sync::Arc;
use tracing::debug;

/// Semantic searcher over one collection
pub struct Searcher {
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl Searcher {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
        }
    }

    /// Search for chunks matching the query
    ///
    /// May return fewer than `limit` hits once filtering and deduplication
    /// have run.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        min_score: f32,
        filter: &HitFilter,
    ) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed(query)?;
        let hits = self
            .store
            .search(&self.collection, &query_embedding, limit, min_score)?;
        let raw = hits.len();

        let hits = deduplicate(hits.into_iter().filter(|h| filter.matches(h)).collect());
        debug!(raw, kept = hits.len(), "Search results");
        Ok(hits)
    }

    /// Get collection statistics
    pub fn stats(&self) -> Result<CollectionInfo> {
        self.store.collection_info(&self.collection)
    }
}

/// Format search hits for terminal display
///
/// `compact` prints only locations; otherwise up to `excerpt_lines` lines of
/// each chunk are shown.
pub fn format_results(hits: &[SearchHit], compact: bool, excerpt_lines: usize) -> String {
    let mut output = String::new();

    for (i, hit) in hits.iter().enumerate() {
        let location = if hit.start_line == hit.end_line {
            format!("{}:{}", hit.file_path, hit.start_line)
        } else {
            format!("{}:{}-{}", hit.file_path, hit.start_line, hit.end_line)
        };

        let score_pct = (hit.score * 100.0) as u32;
        let score_color = if score_pct >= 80 {
            "green"
        } else if score_pct >= 60 {
            "yellow"
        } else {
            "red"
        };

        output.push_str(&format!(
            "\n{} {} {} ({}%)\n",
            format!("[{}]", i + 1).dimmed(),
            location.cyan().bold(),
            format!("[{}]", hit.language).dimmed(),
            format!("{}", score_pct).color(score_color)
        ));

        if compact {
            continue;
        }

        output.push_str(&format!("{}\n", "─".repeat(60).dimmed()));
        let lines: Vec<&str> = hit.content.lines().collect();
        for (j, line) in lines.iter().take(excerpt_lines).enumerate() {
            let line_num = hit.start_line + j;
            output.push_str(&format!("{} {}\n", format!("{:4}", line_num).dimmed(), line));
        }

        if lines.len() > excerpt_lines {
            output.push_str(&format!(
                "{}\n",
                format!("     ... ({} more lines)", lines.len() - excerpt_lines).dimmed()
            ));
        }
    }

    output
}

/// Format hits as JSON
pub fn format_results_json(hits: &[SearchHit]) -> Result<String> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct JsonHit<'a> {
        file: &'a str,
        start_line: usize,
        end_line: usize,
        score: f32,
        language: &'a str,
        content: &'a str,
    }

    let json_hits: Vec<JsonHit<'_>> = hits
        .iter()
        .map(|h| JsonHit {
            file: &h.file_path,
            start_line: h.start_line,
            end_line: h.end_line,
            score: h.score,
            language: &h.language,
            content: &h.content,
        })
        .collect();

    Ok(serde_json::to_string_pretty(&json_hits)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEmbedder, RecordingStore};

    fn hit(file: &str, start: usize, end: usize, score: f32, language: &str) -> SearchHit {
        SearchHit {
            id: crate::store::point_id(file, start, end),
            score,
            file_path: file.to_string(),
            content: (start..=end).map(|i| format!("line {}\n", i)).collect(),
            start_line: start,
            end_line: end,
            language: language.to_string(),
        }
    }

    fn searcher(hits: Vec<SearchHit>) -> Searcher {
        let store = Arc::new(RecordingStore::new());
        *store.search_results.lock().unwrap() = hits;
        Searcher::new(Arc::new(FakeEmbedder::new(4)), store, "code_embeddings")
    }

    #[test]
    fn test_search_deduplicates_overlapping_hits() {
        let small_overlap = searcher(vec![
            hit("a.go", 1, 50, 0.9, "go"),
            hit("a.go", 41, 90, 0.8, "go"),
            hit("b.go", 1, 50, 0.7, "go"),
        ]);
        let hits = small_overlap
            .search("query", 10, 0.0, &HitFilter::new())
            .unwrap();
        assert_eq!(hits.len(), 3);

        let large_overlap = searcher(vec![
            hit("a.go", 1, 50, 0.9, "go"),
            hit("a.go", 11, 60, 0.8, "go"),
            hit("b.go", 1, 50, 0.7, "go"),
        ]);
        let hits = large_overlap
            .search("query", 10, 0.0, &HitFilter::new())
            .unwrap();
        let files: Vec<_> = hits.iter().map(|h| (h.file_path.as_str(), h.start_line)).collect();
        assert_eq!(files, vec![("a.go", 1), ("b.go", 1)]);
    }

    #[test]
    fn test_search_applies_filter_and_min_score() {
        let searcher = searcher(vec![
            hit("src/a.rs", 1, 10, 0.9, "rust"),
            hit("src/b.py", 1, 10, 0.8, "python"),
            hit("src/c.rs", 1, 10, 0.1, "rust"),
        ]);

        let filter = HitFilter::new().with_languages(vec!["rust".into()]);
        let hits = searcher.search("query", 10, 0.5, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "src/a.rs");
    }

    #[test]
    fn test_stats_on_missing_collection_fails() {
        assert!(searcher(vec![]).stats().is_err());
    }

    #[test]
    fn test_format_results() {
        colored::control::set_override(false);
        let hits = vec![hit("a.go", 3, 8, 0.85, "go")];

        let full = format_results(&hits, false, 2);
        assert!(full.contains("a.go:3-8"));
        assert!(full.contains("(85%)"));
        assert!(full.contains("line 4"));
        assert!(!full.contains("line 5"));
        assert!(full.contains("(4 more lines)"));

        let compact = format_results(&hits, true, 2);
        assert!(compact.contains("a.go:3-8"));
        assert!(!compact.contains("line 3"));
    }

    #[test]
    fn test_format_results_json() {
        let json = format_results_json(&[hit("a.go", 1, 2, 0.5, "go")]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["file"], "a.go");
        assert_eq!(parsed[0]["end_line"], 2);
    }
}
