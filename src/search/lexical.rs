use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{RelevanceError, Result};

/// Lines past this are never scored.
pub const LEXICAL_LINE_CAP: usize = 1000;

/// Weight of a keyword hit on 1-based line `line`: ~9.09 on line 1,
/// ~0.91 on line 100, ~0.099 on line 1000.
pub fn line_weight(line: usize) -> f64 {
    1.0 / (0.1 + line as f64 / 100.0)
}

/// Score already-read lines against `keywords` (which must be lowercase).
///
/// Every keyword found as a substring of a line adds that line's weight, so
/// a keyword repeated across lines keeps accumulating.
pub fn score_lines<I, S>(lines: I, keywords: &[String], cap: usize) -> f64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut score = 0.0;
    for (idx, line) in lines.into_iter().take(cap).enumerate() {
        let line = line.as_ref().to_lowercase();
        let weight = line_weight(idx + 1);
        for keyword in keywords {
            if line.contains(keyword.as_str()) {
                score += weight;
            }
        }
    }
    score
}

/// Open `path` and score its first `cap` lines.
pub fn score_file(path: &Path, keywords: &[String], cap: usize) -> Result<f64> {
    let file = File::open(path).map_err(|e| RelevanceError::file_access(path, e))?;
    let mut reader = BufReader::new(file);
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    while lines.len() < cap {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| RelevanceError::file_access(path, e))?;
        if n == 0 {
            break;
        }
        lines.push(String::from_utf8_lossy(&buf).into_owned());
    }

    Ok(score_lines(&lines, keywords, cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn kws(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_line_weight_values() {
        assert!((line_weight(1) - 9.0909).abs() < 1e-3);
        assert!((line_weight(100) - 0.9091).abs() < 1e-3);
        assert!((line_weight(1000) - 0.0990).abs() < 1e-3);
    }

    #[test]
    fn test_early_match_beats_late_match() {
        let keywords = kws(&["config"]);
        let mut early = vec!["config here".to_string()];
        early.extend((0..999).map(|_| "filler".to_string()));
        let mut late: Vec<String> = (0..999).map(|_| "filler".to_string()).collect();
        late.push("config here".to_string());

        let early_score = score_lines(&early, &keywords, LEXICAL_LINE_CAP);
        let late_score = score_lines(&late, &keywords, LEXICAL_LINE_CAP);
        assert!(early_score > late_score);
        assert!(late_score > 0.0);
    }

    #[test]
    fn test_case_insensitive_and_accumulates() {
        let keywords = kws(&["parse", "json"]);
        let lines = ["fn Parse_JSON()", "// parse again"];
        let expected = 2.0 * line_weight(1) + line_weight(2);
        assert!((score_lines(lines, &keywords, LEXICAL_LINE_CAP) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_lines_beyond_cap_are_ignored() {
        let keywords = kws(&["needle"]);
        let mut lines: Vec<String> = (0..10).map(|_| "hay".to_string()).collect();
        lines.push("needle".to_string());
        assert_eq!(score_lines(&lines, &keywords, 10), 0.0);
        assert!(score_lines(&lines, &keywords, 11) > 0.0);
    }

    #[test]
    fn test_no_matches_is_zero() {
        assert_eq!(score_lines(["nothing"], &kws(&["absent"]), 5), 0.0);
        assert_eq!(score_lines(["anything"], &[], 5), 0.0);
    }

    #[test]
    fn test_score_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parser.go");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "package config").unwrap();
        writeln!(f, "func ParseJSON() {{}}").unwrap();

        let score = score_file(&path, &kws(&["parse", "config"]), LEXICAL_LINE_CAP).unwrap();
        let expected = line_weight(1) + line_weight(2);
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_score_file_missing_is_file_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = score_file(&dir.path().join("nope.rs"), &kws(&["x"]), 10).unwrap_err();
        assert!(matches!(err, RelevanceError::FileAccess { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_scored_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.txt");
        std::fs::write(&path, b"\xff\xfe config\n").unwrap();
        assert!(score_file(&path, &kws(&["config"]), 10).unwrap() > 0.0);
    }
}
