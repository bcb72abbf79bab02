//! Attribute-path lookups against actor values
//!
//! A lookup expression is a dotted path rooted at `actor`, e.g. `actor.id` or
//! `actor.profile.email`. Evaluation never fails: anything that cannot be
//! followed is simply "not found".

use serde_json::Value;

/// Root segment every lookup expression must start with
pub const ROOT_SEGMENT: &str = "actor";

/// Follow `expr` through `actor`, returning the value it points at.
///
/// `None` means not found: the expression is not rooted at `actor`, a
/// segment names a missing key, or a segment is applied to a non-object.
pub fn evaluate<'a>(actor: &'a Value, expr: &str) -> Option<&'a Value> {
    let mut segments = expr.split('.');
    if segments.next() != Some(ROOT_SEGMENT) {
        return None;
    }

    let mut current = actor;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Comparable text form of a looked-up value.
///
/// Falsy values (`null`, `""`, `0`, `false`) and non-scalars yield `None`;
/// they never identify a user.
pub fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// [`evaluate`] followed by [`scalar`]
pub fn resolve(actor: &Value, expr: &str) -> Option<String> {
    evaluate(actor, expr).and_then(scalar)
}
