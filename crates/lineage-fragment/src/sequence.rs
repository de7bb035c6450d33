//! Ratcliff/Obershelp similarity over arbitrary sequences.
//!
//! The ratio is `2 * M / (len(a) + len(b))`, where `M` is the number of elements in the
//! matching blocks found by repeatedly taking the longest common contiguous block and
//! recursing on both sides of it. Ties between equally long blocks go to the one that
//! starts earliest in `a`, then earliest in `b`, so the result is deterministic.

use std::collections::HashMap;
use std::hash::Hash;

/// Similarity of two sequences in `[0, 1]`. Two empty sequences are identical (1.0).
///
/// # Examples
///
/// ```
/// use lineage_fragment::sequence::ratio;
///
/// let a = ["int", "x", "=", "0", ";"];
/// let b = ["int", "y", "=", "0", ";"];
/// assert_eq!(ratio(&a, &b), 0.8);
/// assert_eq!(ratio::<&str>(&[], &[]), 1.0);
/// ```
pub fn ratio<T: Eq + Hash>(a: &[T], b: &[T]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_count(a, b) as f64 / total as f64
}

/// Character-level [`ratio`] of two strings.
///
/// # Examples
///
/// ```
/// use lineage_fragment::sequence::str_ratio;
///
/// assert_eq!(str_ratio("abcd", "bcde"), 0.75);
/// assert_eq!(str_ratio("", ""), 1.0);
/// assert_eq!(str_ratio("abc", ""), 0.0);
/// ```
pub fn str_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio(&a, &b)
}

/// Total size of all matching blocks.
fn matching_count<T: Eq + Hash>(a: &[T], b: &[T]) -> usize {
    let mut b2j: HashMap<&T, Vec<usize>> = HashMap::new();
    for (j, item) in b.iter().enumerate() {
        b2j.entry(item).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest block `a[i..i+k] == b[j..j+k]` within the given bounds.
fn longest_match<T: Eq + Hash>(
    a: &[T],
    b2j: &HashMap<&T, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    // j2len[j] = length of the longest block ending at a[i-1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    for (i, item) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(item) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| j2len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next.insert(j, k);
                if k > best_k {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_k = k;
                }
            }
        }
        j2len = next;
    }
    (best_i, best_j, best_k)
}
