//! Property-level merge of concurrent edits.
//!
//! When a remote change lands on an entity with unsaved local edits,
//! the two versions are merged field by field against the base the
//! local edits started from. A remote value wins exactly when the
//! remote changed that field relative to the base; otherwise the local
//! value stands.

use crate::cloud::RecordFields;

pub fn merge_fields(
    local: &RecordFields,
    base: &RecordFields,
    remote: &RecordFields,
) -> RecordFields {
    let mut merged = local.clone();

    for (key, remote_value) in remote {
        if base.get(key) != Some(remote_value) {
            merged.insert(key.clone(), remote_value.clone());
        }
    }

    // Fields the remote cleared.
    for key in base.keys() {
        if !remote.contains_key(key) {
            merged.remove(key);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::FieldValue;

    fn fields(pairs: &[(&str, &str)]) -> RecordFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Text(v.to_string())))
            .collect()
    }

    #[test]
    fn test_remote_change_wins_over_local_edit() {
        let base = fields(&[("name", "Dana"), ("phone", "555-0100")]);
        let local = fields(&[("name", "Dana W."), ("phone", "555-0100")]);
        let remote = fields(&[("name", "Dana Whitfield"), ("phone", "555-0100")]);

        let merged = merge_fields(&local, &base, &remote);
        assert_eq!(merged, fields(&[("name", "Dana Whitfield"), ("phone", "555-0100")]));
    }

    #[test]
    fn test_local_edit_survives_unchanged_remote_field() {
        let base = fields(&[("name", "Dana"), ("phone", "555-0100")]);
        let local = fields(&[("name", "Dana"), ("phone", "555-0199")]);
        let remote = fields(&[("name", "Dana"), ("phone", "555-0100")]);

        let merged = merge_fields(&local, &base, &remote);
        assert_eq!(merged, local);
    }

    #[test]
    fn test_disjoint_edits_both_survive() {
        let base = fields(&[("name", "Dana"), ("phone", "555-0100")]);
        let local = fields(&[("name", "Dana"), ("phone", "555-0199")]);
        let remote = fields(&[("name", "Dana Whitfield"), ("phone", "555-0100")]);

        let merged = merge_fields(&local, &base, &remote);
        assert_eq!(
            merged,
            fields(&[("name", "Dana Whitfield"), ("phone", "555-0199")])
        );
    }

    #[test]
    fn test_remote_cleared_field_is_removed() {
        let base = fields(&[("name", "Dana"), ("email", "dana@example.com")]);
        let local = fields(&[("name", "Dana"), ("email", "dana@home.example")]);
        let remote = fields(&[("name", "Dana")]);

        let merged = merge_fields(&local, &base, &remote);
        assert!(!merged.contains_key("email"));
    }

    #[test]
    fn test_local_added_field_survives() {
        let base = fields(&[("name", "Dana")]);
        let local = fields(&[("name", "Dana"), ("address", "18 Candlewood Ln")]);
        let remote = fields(&[("name", "Dana")]);

        let merged = merge_fields(&local, &base, &remote);
        assert_eq!(merged, local);
    }

    #[test]
    fn test_remote_added_field_is_adopted() {
        let base = fields(&[("name", "Dana")]);
        let local = fields(&[("name", "Dana")]);
        let remote = fields(&[("name", "Dana"), ("phone", "555-0100")]);

        let merged = merge_fields(&local, &base, &remote);
        assert_eq!(merged, remote);
    }
}
