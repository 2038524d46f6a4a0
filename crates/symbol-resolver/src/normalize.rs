use std::collections::BTreeSet;

const CORPORATE_SUFFIXES: &[&str] = &[
    "limited",
    "ltd",
    "inc",
    "incorporated",
    "plc",
    "corp",
    "corporation",
    "co",
    "company",
];

/// Lowercase, strip punctuation, collapse whitespace and drop corporate suffixes.
pub fn normalize_company_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else if c.is_whitespace() || matches!(c, '&' | '-' | '.' | ',' | '/') {
                ' '
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect();

    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| !CORPORATE_SUFFIXES.contains(t))
        .collect();

    // A name made only of suffixes ("The Company") keeps its words.
    if tokens.is_empty() {
        return cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    tokens.join(" ")
}

pub fn tokens(normalized: &str) -> BTreeSet<&str> {
    normalized.split_whitespace().collect()
}

/// Similarity of a normalized query against a normalized candidate name.
///
/// 1.0 on an exact match, otherwise `max(jaccard, 0.9 * containment)` where
/// containment is the share of query tokens found in the candidate.
pub fn similarity(query: &str, candidate: &str) -> f64 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    if query == candidate {
        return 1.0;
    }

    let q = tokens(query);
    let c = tokens(candidate);
    let common = q.intersection(&c).count() as f64;
    let union = q.union(&c).count() as f64;
    if union == 0.0 {
        return 0.0;
    }

    let jaccard = common / union;
    let containment = common / q.len() as f64;
    jaccard.max(0.9 * containment)
}

/// Ticker without an exchange suffix: `RELIANCE.NS` -> `RELIANCE`.
pub fn base_ticker(ticker: &str) -> &str {
    match ticker.rsplit_once('.') {
        Some((base, suffix))
            if suffix.len() == 2 && suffix.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            base
        }
        _ => ticker,
    }
}
