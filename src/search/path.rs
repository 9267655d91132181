use std::path::Path;

use crate::search::keywords::extract_keywords;

const KEYWORD_IN_PATH: f64 = 0.5;
const KEYWORD_IN_BASENAME: f64 = 0.5;
const SEGMENT_MATCH: f64 = 0.3;
const TOPIC_AFFINITY: f64 = 0.2;
const STRUCTURAL_HINT: f64 = 0.1;

/// Extension → query words that point at that language.
const TOPIC_AFFINITY_PAIRS: &[(&[&str], &[&str])] = &[
    (&["go"], &["go", "golang"]),
    (&["py"], &["python"]),
    (&["java"], &["java"]),
    (&["js", "jsx", "mjs"], &["javascript", "js", "node"]),
    (&["ts", "tsx"], &["typescript", "ts"]),
    (&["cs"], &["c#", "csharp", "dotnet"]),
    (&["php"], &["php"]),
];

const STRUCTURAL_HINTS: &[&[&str]] = &[
    &["main.", "index."],
    &["controller", "service"],
    &["api", "handler"],
];

/// Keyword-driven path score: 0.5 per keyword in the path, another 0.5 when
/// it is in the file name. Uncapped.
pub fn path_relevance_score(path: &str, keywords: &[String]) -> f64 {
    let path_lower = path.to_lowercase();
    let base_lower = base_name(&path_lower);
    let mut score = 0.0;
    for keyword in keywords {
        if path_lower.contains(keyword.as_str()) {
            score += KEYWORD_IN_PATH;
            if base_lower.contains(keyword.as_str()) {
                score += KEYWORD_IN_BASENAME;
            }
        }
    }
    score
}

/// Query-driven path score used by the hybrid ranker, capped at 1.0.
///
/// Adds segment/query overlap, extension-topic affinity and a few
/// structural hints on top of the keyword-driven score.
pub fn query_path_relevance_score(path: &str, query: &str) -> f64 {
    let path_lower = path.to_lowercase().replace('\\', "/");
    let query_lower = query.trim().to_lowercase();

    let mut score = path_relevance_score(&path_lower, &extract_keywords(query));

    if !query_lower.is_empty() && segment_overlaps_query(&path_lower, &query_lower) {
        score += SEGMENT_MATCH;
    }

    if has_topic_affinity(&path_lower, &query_lower) {
        score += TOPIC_AFFINITY;
    }

    for hints in STRUCTURAL_HINTS {
        if hints.iter().any(|h| path_lower.contains(h)) {
            score += STRUCTURAL_HINT;
        }
    }

    score.min(1.0)
}

fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// Directory names plus the file stem.
fn path_segments(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(last) = segments.pop() {
        let stem = Path::new(last)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(last);
        segments.push(stem);
    }
    segments.retain(|s| !s.is_empty() && *s != "." && *s != "..");
    segments
}

fn segment_overlaps_query(path: &str, query: &str) -> bool {
    path_segments(path)
        .iter()
        .any(|seg| query.contains(seg) || seg.contains(query))
}

fn has_topic_affinity(path: &str, query: &str) -> bool {
    let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric() && c != '#')
                .to_string()
        })
        .collect();

    TOPIC_AFFINITY_PAIRS.iter().any(|(exts, topics)| {
        exts.contains(&ext) && topics.iter().any(|t| tokens.iter().any(|tok| tok == t))
    })
}
