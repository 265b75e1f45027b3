/// Result of pulling the aggregation name out of a k6 threshold expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation<'a> {
    Found(&'a str),
    NotFound,
}

/// Extract the aggregation a threshold expression compares, e.g. `p(95)` from
/// `p(95)<500` or `rate` from `rate >= 0.99`.
///
/// The aggregation is the trimmed text before the first `<`, `<=`, `>` or `>=`.
/// An expression with no such operator yields [`Aggregation::NotFound`].
pub fn parse_aggregation(expression: &str) -> Aggregation<'_> {
    let Some(at) = expression.find(['<', '>']) else {
        return Aggregation::NotFound;
    };
    Aggregation::Found(expression[..at].trim())
}
