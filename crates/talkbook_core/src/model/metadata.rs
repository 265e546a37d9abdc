//! Name/content metadata entries for projects and documents.

use serde::{Deserialize, Serialize};

/// One `(name, content)` metadata entry. Names may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub content: String,
}

impl Metadata {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Replaces every entry named `name` with one entry, or appends it.
pub(crate) fn set_entry(entries: &mut Vec<Metadata>, name: &str, content: &str) {
    match entries.iter().position(|entry| entry.name == name) {
        Some(first) => {
            entries[first].content = content.to_string();
            let mut index = 0;
            entries.retain(|entry| {
                let keep = index <= first || entry.name != name;
                index += 1;
                keep
            });
        }
        None => entries.push(Metadata::new(name, content)),
    }
}

/// Removes every entry named `name`; returns how many were removed.
pub(crate) fn remove_entries(entries: &mut Vec<Metadata>, name: &str) -> usize {
    let before = entries.len();
    entries.retain(|entry| entry.name != name);
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::{remove_entries, set_entry, Metadata};

    #[test]
    fn set_entry_collapses_duplicates_and_keeps_position() {
        let mut entries = vec![
            Metadata::new("dc:title", "a"),
            Metadata::new("dc:creator", "x"),
            Metadata::new("dc:title", "b"),
        ];
        set_entry(&mut entries, "dc:title", "c");
        assert_eq!(
            entries,
            vec![Metadata::new("dc:title", "c"), Metadata::new("dc:creator", "x")]
        );
        set_entry(&mut entries, "dc:date", "2020");
        assert_eq!(entries.len(), 3);
        assert_eq!(remove_entries(&mut entries, "dc:creator"), 1);
        assert_eq!(remove_entries(&mut entries, "missing"), 0);
    }

    #[test]
    fn metadata_serializes_as_plain_fields() {
        let json = serde_json::to_string(&Metadata::new("n", "c")).unwrap();
        assert_eq!(json, r#"{"name":"n","content":"c"}"#);
    }
}
