//! Dotted field-path resolution against the canonical document projection.
//!
//! Paths look like `claims[0].adjustments[1].amount` or `header.set_code`.
//! Resolution never faults: any step that does not apply (missing key,
//! index into a non-array, out-of-range or negative index) short-circuits
//! the whole expression to `None`.

use serde_json::Value;

/// Resolve a dotted, index-bearing path against a navigable value.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }
        current = step(current, part)?;
    }
    Some(current)
}

fn step<'a>(current: &'a Value, part: &str) -> Option<&'a Value> {
    match part.find('[') {
        Some(open) => {
            let close = part.find(']')?;
            if close < open {
                return None;
            }
            let name = &part[..open];
            let index: usize = part[open + 1..close].parse().ok()?;
            let array = if name.is_empty() {
                current
            } else {
                current.as_object()?.get(name)?
            };
            array.as_array()?.get(index)
        }
        None => current.as_object()?.get(part),
    }
}

#[cfg(test)]
fn fixture() -> Value {
    serde_json::json!({
        "header": { "set_code": "835", "control_number": "0001" },
        "financial_info": { "total_paid": "1000.00" },
        "claims": [
            { "claim_id": "A", "total_paid": "200" },
            { "claim_id": "B", "total_paid": "250" }
        ]
    })
}

#[test]
fn resolves_nested_names_and_indexes() {
    let root = fixture();
    assert_eq!(
        resolve(&root, "financial_info.total_paid"),
        Some(&Value::String("1000.00".to_string()))
    );
    assert_eq!(
        resolve(&root, "claims[1].claim_id"),
        Some(&Value::String("B".to_string()))
    );
    assert_eq!(
        resolve(&root, "header.set_code"),
        Some(&Value::String("835".to_string()))
    );
}

#[test]
fn failing_steps_short_circuit_to_none() {
    let root = fixture();
    assert_eq!(resolve(&root, "missing"), None);
    assert_eq!(resolve(&root, "missing.deeper.still"), None);
    assert_eq!(resolve(&root, "claims[9].claim_id"), None);
    assert_eq!(resolve(&root, "claims[-1].claim_id"), None);
    assert_eq!(resolve(&root, "financial_info[0]"), None);
    assert_eq!(resolve(&root, "claims[0].total_paid.deeper"), None);
}

#[test]
fn resolution_composes_across_path_concatenation() {
    let root = fixture();
    let claim = resolve(&root, "claims[0]").unwrap();
    assert_eq!(
        resolve(claim, "total_paid"),
        resolve(&root, "claims[0].total_paid")
    );
}
