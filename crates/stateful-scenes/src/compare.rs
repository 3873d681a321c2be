//! Tolerance-aware structural comparison of attribute values

use serde_json::{Map, Value};

/// How a value takes part in a comparison
enum Shape<'a> {
    Mapping(&'a Map<String, Value>),
    Sequence(&'a [Value]),
    Numeric(f64),
    Scalar,
}

fn shape(value: &Value) -> Shape<'_> {
    match value {
        Value::Object(map) => Shape::Mapping(map),
        Value::Array(items) => Shape::Sequence(items),
        Value::Number(n) => n.as_f64().map(Shape::Numeric).unwrap_or(Shape::Scalar),
        _ => Shape::Scalar,
    }
}

/// Does `actual` match `wanted`?
///
/// - mappings: every key of `wanted` must exist in `actual` and match;
///   extra keys in `actual` are ignored
/// - sequences: element-wise over the shorter of the two; a length
///   mismatch alone never fails the comparison
/// - numbers: `|wanted - actual| <= tolerance`
/// - anything else: plain equality, so `true` never equals `1`
pub fn compare(wanted: &Value, actual: &Value, tolerance: f64) -> bool {
    match (shape(wanted), shape(actual)) {
        (Shape::Mapping(wanted), Shape::Mapping(actual)) => wanted.iter().all(|(key, value)| {
            actual
                .get(key)
                .is_some_and(|other| compare(value, other, tolerance))
        }),
        (Shape::Sequence(wanted), Shape::Sequence(actual)) => wanted
            .iter()
            .zip(actual)
            .all(|(a, b)| compare(a, b, tolerance)),
        (Shape::Numeric(a), Shape::Numeric(b)) => (a - b).abs() <= tolerance,
        _ => wanted == actual,
    }
}
