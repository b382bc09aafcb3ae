use crate::model::FieldValue;
use std::collections::BTreeMap;

/// Changed fields of the edited form relative to the committed canonical
/// snapshot. Restricted to keys present in the form; a key the committed
/// state never had counts as changed.
pub fn changed_fields(
    form: &BTreeMap<String, FieldValue>,
    committed: &BTreeMap<String, FieldValue>,
) -> BTreeMap<String, FieldValue> {
    form.iter()
        .filter(|(key, value)| committed.get(*key) != Some(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
