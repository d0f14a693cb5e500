//! Bounded edit distance

/// Levenshtein distance between `left` and `right`, giving up early
///
/// Returns `limit + 1` as soon as the distance is known to exceed `limit`:
/// either the lengths differ by more than `limit`, or every cell of a DP row
/// is already above it.
pub fn levenshtein_with_limit(left: &str, right: &str, limit: usize) -> usize {
    if left == right {
        return 0;
    }

    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    if left.len().abs_diff(right.len()) > limit {
        return limit + 1;
    }

    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];

    for (i, left_char) in left.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];

        for (j, right_char) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(left_char != right_char);
            let distance = (previous[j + 1] + 1).min(current[j] + 1).min(substitution);
            current[j + 1] = distance;
            row_min = row_min.min(distance);
        }

        if row_min > limit {
            return limit + 1;
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}

/// Whether `left` and `right` are at most `limit` edits apart
pub fn within_distance(left: &str, right: &str, limit: usize) -> bool {
    levenshtein_with_limit(left, right, limit) <= limit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_insertion() {
        assert_eq!(levenshtein_with_limit("ransom", "ransome", 1), 1);
        assert!(within_distance("ransom", "ransome", 1));
        assert!(!within_distance("ransom", "ransome", 0));
    }

    #[test]
    fn test_length_short_circuit() {
        assert_eq!(levenshtein_with_limit("ai", "artificial", 2), 3);
    }

    #[test]
    fn test_row_early_exit() {
        // Same length, every character differs
        assert_eq!(levenshtein_with_limit("abcd", "wxyz", 1), 2);
        assert_eq!(levenshtein_with_limit("abcd", "wxyz", 4), 4);
    }

    #[test]
    fn test_unicode_characters() {
        assert_eq!(levenshtein_with_limit("cafe", "café", 1), 1);
        assert_eq!(levenshtein_with_limit("", "ab", 2), 2);
    }
}
