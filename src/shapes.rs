//! Tensor shape text parsing.
//!
//! Shape lists are free text: any number of lines, each holding zero or more
//! bracketed groups such as `[4096, 2048]`. A group's parameter count is the
//! product of its dimensions and a list's count is the sum over all groups.
//!
//! Parsing never fails. A group with an empty body or a token that is not an
//! unsigned integer contributes zero, so `[abc]` and `[]` both count as 0.

use std::sync::OnceLock;

use regex::Regex;

/// Characters removed from a group before splitting on commas
/// (digit-grouping marks people paste from papers and model cards).
const STRIPPED: [char; 5] = ['_', '\'', '\u{2009}', '\u{202F}', '\u{00A0}'];

fn group_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("static shape regex"))
}

/// One bracketed group found in a shape list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeGroup {
    /// Text between the brackets, as typed.
    pub raw: String,
    /// Parsed dimensions; empty when the group is malformed.
    pub dims: Vec<u64>,
    /// Product of `dims`, or 0 when the group is malformed.
    pub product: u64,
}

/// Parse the dimensions of one group body (without brackets).
///
/// Returns `None` when the body is empty or any token is not an unsigned
/// integer. A single trailing comma is tolerated.
pub fn parse_dims(inner: &str) -> Option<Vec<u64>> {
    let cleaned: String = inner
        .chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED.contains(c))
        .collect();
    let body = cleaned.strip_suffix(',').unwrap_or(&cleaned);
    if body.is_empty() {
        return None;
    }

    body.split(',').map(|tok| tok.parse::<u64>().ok()).collect()
}

/// Product of one group's dimensions, 0 for malformed groups.
#[inline]
pub fn group_product(inner: &str) -> u64 {
    match parse_dims(inner) {
        Some(dims) => dims.iter().fold(1u64, |acc, &d| acc.saturating_mul(d)),
        None => 0,
    }
}

/// Sum of the products of every bracketed group in `text`.
pub fn sum_shapes(text: &str) -> u64 {
    group_regex()
        .captures_iter(text)
        .map(|cap| group_product(&cap[1]))
        .fold(0u64, u64::saturating_add)
}

/// Every bracketed group in `text`, in order, with its parsed product.
pub fn parse_groups(text: &str) -> Vec<ShapeGroup> {
    group_regex()
        .captures_iter(text)
        .map(|cap| {
            let raw = cap[1].to_string();
            let dims = parse_dims(&raw).unwrap_or_default();
            let product = if dims.is_empty() {
                0
            } else {
                dims.iter().fold(1u64, |acc, &d| acc.saturating_mul(d))
            };
            ShapeGroup { raw, dims, product }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_across_lines() {
        assert_eq!(sum_shapes("[2,3]\n[4]"), 10);
    }

    #[test]
    fn test_empty_and_garbage_are_zero() {
        assert_eq!(sum_shapes(""), 0);
        assert_eq!(sum_shapes("[abc]"), 0);
        assert_eq!(sum_shapes("no brackets here"), 0);
        assert_eq!(sum_shapes("[]"), 0);
        assert_eq!(sum_shapes("[ , ]"), 0);
    }

    #[test]
    fn test_one_bad_token_zeroes_only_its_group() {
        assert_eq!(sum_shapes("[2,x] [5,5]"), 25);
        assert_eq!(sum_shapes("[2,-3]"), 0);
        assert_eq!(sum_shapes("[2.5, 4]"), 0);
    }

    #[test]
    fn test_several_groups_per_line() {
        assert_eq!(sum_shapes("q: [4096, 4096] k: [1024, 4096]"), 16_777_216 + 4_194_304);
    }

    #[test]
    fn test_separators_stripped() {
        assert_eq!(sum_shapes("[151_936, 2_048]"), 151_936 * 2_048);
        assert_eq!(sum_shapes("[151\u{202F}936, 2\u{2009}048]"), 151_936 * 2_048);
        assert_eq!(sum_shapes("[1'000, 3]"), 3_000);
    }

    #[test]
    fn test_trailing_comma_tolerated() {
        assert_eq!(sum_shapes("[2048,]"), 2048);
        assert_eq!(sum_shapes("[2,,3]"), 0);
    }

    #[test]
    fn test_nested_brackets_use_innermost() {
        assert_eq!(sum_shapes("[[2,3],[4]]"), 10);
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let huge = format!("[{m},{m}]", m = u64::MAX);
        assert_eq!(sum_shapes(&huge), u64::MAX);
        assert_eq!(sum_shapes(&format!("{huge}\n{huge}")), u64::MAX);
    }

    #[test]
    fn test_parse_groups_reports_each_group() {
        let groups = parse_groups("[2,3]\n[oops] [7]");
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].dims, vec![2, 3]);
        assert_eq!(groups[0].product, 6);
        assert_eq!(groups[1].raw, "oops");
        assert!(groups[1].dims.is_empty());
        assert_eq!(groups[1].product, 0);
        assert_eq!(groups[2].product, 7);
    }

    #[test]
    fn test_zero_dimension_is_valid_and_zero() {
        let groups = parse_groups("[0, 5]");
        assert_eq!(groups[0].dims, vec![0, 5]);
        assert_eq!(groups[0].product, 0);
    }
}
