use lineage_core::{CodeLine, LineId, LineageConfig, LogContext, MatcherConfig, Snippet};
use lineage_difflens::{compare_snippets, ComparisonResult, LineMatcher};

const SEARCH_V0: &str = "\
public static int search(int[] arr, int key) {
    int low = 0;
    int high = arr.length - 1;
    while (low <= high) {
        int mid = (low + high) / 2;
        if (arr[mid] == key) {
            return mid;
        } else if (arr[mid] < key) {
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }
    return -1;
}
";

const SEARCH_V1: &str = "\
public static int search(int[] values, int target) {
    // narrow the window until it is empty
    int left = 0;
    int right = values.length - 1;
    while (left <= right) {
        int middle = left + (right - left) / 2;
        if (values[middle] == target) {
            return middle;
        }
        if (values[middle] < target) {
            left = middle + 1;
        } else {
            right = middle - 1;
        }
    }
    return NOT_FOUND;
}
";

fn compare(old: &str, new: &str) -> ComparisonResult {
    compare_snippets(
        &Snippet::new("BinarySearch", "KF0", 0, "nop", old),
        &Snippet::new("BinarySearch", "KF0", 1, "p1", new),
        &LineageConfig::default(),
        &LogContext::disabled(),
    )
    .unwrap()
}

#[test]
fn partition_covers_every_content_line() {
    let result = compare(SEARCH_V0, SEARCH_V1);
    assert!(result.mismatches.is_empty(), "{:?}", result.mismatches);

    let content = result.diff.content_lines().count();
    let accounted =
        2 * result.modifications.len() + result.insertions.len() + result.deletions.len();
    assert_eq!(accounted, content);

    let mut seen: Vec<LineId> = result
        .modifications
        .iter()
        .flat_map(|p| [p.removed, p.added])
        .chain(result.insertions.iter().copied())
        .chain(result.deletions.iter().copied())
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), content, "a line was assigned twice");
}

#[test]
fn unchanged_lines_agree_on_both_sides() {
    let result = compare(SEARCH_V0, SEARCH_V1);
    let m = &result.metrics;
    assert_eq!(
        m.old_lines - m.modifications - m.deletions.total,
        m.new_lines - m.modifications - m.insertions.total
    );
    assert_eq!(m.unchanged, m.old_lines - m.modifications - m.deletions.total);
}

#[test]
fn comparison_is_deterministic() {
    let a = compare(SEARCH_V0, SEARCH_V1);
    let b = compare(SEARCH_V0, SEARCH_V1);
    assert_eq!(a.modifications, b.modifications);
    assert_eq!(a.insertions, b.insertions);
    assert_eq!(a.deletions, b.deletions);
    assert_eq!(a.metrics, b.metrics);
}

#[test]
fn accepted_scores_respect_threshold() {
    let result = compare(SEARCH_V0, SEARCH_V1);
    assert!(!result.modifications.is_empty());
    for pair in &result.modifications {
        assert!(
            (0.6..=1.0).contains(&pair.score),
            "{} -> {}: {}",
            result.text(pair.removed),
            result.text(pair.added),
            pair.score
        );
        let s = pair.sub_scores;
        for sub in [s.sequence_code, s.tokens_code, s.sequence_comment, s.tokens_comment] {
            assert!((0.0..=1.0).contains(&sub));
        }
        assert!(pair.classification.is_some(), "every pair is classified");
    }
    assert!((0.0..=1.0).contains(&result.metrics.avg_similarity));
}

#[test]
fn weaker_duplicate_becomes_deletion() {
    let result = compare(
        "int x = compute(a, b);\nint y = compute(a, c);\n",
        "int result = compute(a, b);\n",
    );
    assert_eq!(result.modifications.len(), 1);
    let pair = &result.modifications[0];
    assert_eq!(result.text(pair.removed), "int x = compute(a, b);");
    assert_eq!(result.text(pair.added), "int result = compute(a, b);");

    assert_eq!(result.deletions.len(), 1);
    assert_eq!(result.text(result.deletions[0]), "int y = compute(a, c);");
    assert!(result.insertions.is_empty());
}

#[test]
fn equal_scores_keep_the_first_binding() {
    let config = MatcherConfig::default();
    let raw = ["-return total;", "-foo();", "-return total;", "+return total;"];
    let lines: Vec<CodeLine> = raw
        .iter()
        .enumerate()
        .filter_map(|(i, l)| CodeLine::parse(LineId(i), l, &config.stopwords))
        .collect();
    let refs: Vec<&CodeLine> = lines.iter().collect();
    let alignment = LineMatcher::new(&config).align(&refs, &LogContext::disabled());

    assert_eq!(alignment.pairs.len(), 1);
    assert_eq!(alignment.pairs[0].removed, LineId(0));
    assert_eq!(alignment.unmatched_removed, vec![LineId(1), LineId(2)]);
    assert!(alignment.is_balanced());
}

#[test]
fn ranking_prefers_the_closer_free_addition() {
    let config = MatcherConfig::default();
    let raw = ["-x++;", "-x++;", "+x++;", "+x++;"];
    let lines: Vec<CodeLine> = raw
        .iter()
        .enumerate()
        .filter_map(|(i, l)| CodeLine::parse(LineId(i), l, &config.stopwords))
        .collect();
    let refs: Vec<&CodeLine> = lines.iter().collect();
    let alignment = LineMatcher::new(&config).align(&refs, &LogContext::disabled());

    let pairs: Vec<_> = alignment.pairs.iter().map(|p| (p.removed, p.added)).collect();
    assert_eq!(pairs, vec![(LineId(0), LineId(2)), (LineId(1), LineId(3))]);
    assert!(alignment.unmatched_added.is_empty());
}

#[test]
fn result_serializes_in_camel_case() {
    let result = compare("int x = 0;\n", "int y = 0;\n");
    let json = serde_json::to_value(&result).unwrap();
    assert!(json["metrics"]["avgSimilarity"].as_f64().is_some());
    assert_eq!(json["metrics"]["changeTypes"]["Rename"], 1);
    assert_eq!(json["modifications"][0]["classification"]["change"], "Rename");
    assert_eq!(json["old"]["promptId"], "nop");
}
