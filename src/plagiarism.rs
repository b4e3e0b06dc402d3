use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::database as db;
use crate::models::{PlagiarismReport, Submission};

/// Similarity a match has to exceed, strictly, to be flagged
pub const PLAGIARISM_THRESHOLD: f64 = 0.7;

pub fn exceeds_threshold(score: f64) -> bool {
    score > PLAGIARISM_THRESHOLD
}

/// Dice coefficient over character bigrams, ignoring all whitespace
///
/// Returns a score in `[0, 1]`; identical texts score 1.
pub fn similarity(first: &str, second: &str) -> f64 {
    let first: Vec<char> = first.chars().filter(|c| !c.is_whitespace()).collect();
    let second: Vec<char> = second.chars().filter(|c| !c.is_whitespace()).collect();

    if first == second {
        return 1.0;
    }
    if first.len() < 2 || second.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::new();
    for pair in first.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_default() += 1;
    }

    let mut intersection = 0;
    for pair in second.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1]))
            && *count > 0
        {
            *count -= 1;
            intersection += 1;
        }
    }

    (2 * intersection) as f64 / (first.len() + second.len() - 2) as f64
}

/// The candidate most similar to `source`; the earliest one wins ties
pub fn best_match<'a>(
    source: &str,
    candidates: impl IntoIterator<Item = (i64, &'a str)>,
) -> Option<(i64, f64)> {
    let mut best: Option<(i64, f64)> = None;
    for (id, code) in candidates {
        let score = similarity(source, code);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((id, score));
        }
    }
    best
}

/// Compares a passing submission with every other passing one for the same problem
///
/// Never fails: a storage error yields an unflagged report carrying an error marker.
pub async fn detect(pool: &SqlitePool, submission: &Submission) -> PlagiarismReport {
    let candidates =
        match db::find_passing_submissions(pool, submission.problem_id, submission.id).await {
            Ok(candidates) => candidates,
            Err(e) => {
                log::error!(
                    "Plagiarism check for submission {} failed: {e}",
                    submission.id
                );
                return PlagiarismReport::failed("Plagiarism check failed");
            }
        };

    let best = best_match(
        &submission.code,
        candidates.iter().map(|c| (c.id, c.code.as_str())),
    );
    match best {
        Some((id, score)) if exceeds_threshold(score) => {
            log::info!(
                "Submission {} flagged: {:.3} similar to submission {id}",
                submission.id,
                score
            );
            PlagiarismReport::flagged(id, score)
        }
        _ => PlagiarismReport::unflagged(),
    }
}
