//! Cross-chapter lore: what the extractor reports per chapter and the
//! accumulated, provenance-preserving index built from it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::DocumentId;

/// A character as reported by one extraction pass over one chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedCharacter {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Byte offset of the first mention inside the chapter text.
    pub position: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extraction {
    pub characters: Vec<ExtractedCharacter>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub chapter_id: DocumentId,
    pub position: usize,
}

/// One recorded value of an attribute together with where it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub value: String,
    pub chapter_id: DocumentId,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterEntry {
    /// Attribute name → every value ever recorded, oldest first.  Never
    /// overwritten or pruned.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<AttributeValue>>,
    pub first_mention: Mention,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

impl CharacterEntry {
    pub fn new(first_mention: Mention) -> Self {
        Self {
            attributes: BTreeMap::new(),
            mentions: vec![first_mention.clone()],
            first_mention,
        }
    }

    /// Most recently recorded value for `attribute`.
    pub fn latest(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute).and_then(|values| values.last())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManuscriptIndex {
    pub characters: BTreeMap<String, CharacterEntry>,
    pub last_updated: BTreeMap<DocumentId, DateTime<Utc>>,
}

impl ManuscriptIndex {
    pub fn character(&self, name: &str) -> Option<&CharacterEntry> {
        self.characters.get(name.trim())
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Compact plain-text rendering used as prompt context for analysis.
    ///
    /// ```text
    /// Elara: eye_color = blue (ch-1), green (ch-2); home = Vell (ch-1)
    /// ```
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.characters.len());
        for (name, entry) in &self.characters {
            let attrs = entry
                .attributes
                .iter()
                .map(|(attr, values)| {
                    let rendered = values
                        .iter()
                        .map(|v| format!("{} ({})", v.value, v.chapter_id))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{attr} = {rendered}")
                })
                .collect::<Vec<_>>()
                .join("; ");
            if attrs.is_empty() {
                lines.push(name.clone());
            } else {
                lines.push(format!("{name}: {attrs}"));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    Attribute,
}

/// Two recorded values of the same attribute for the same character that
/// disagree.  Emitted by the merge step; never stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contradiction {
    pub kind: ContradictionKind,
    pub character_name: String,
    pub attribute: String,
    pub original: AttributeValue,
    pub new: AttributeValue,
}

impl fmt::Display for Contradiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}'s {} was \"{}\" in {} but is \"{}\" in {}",
            self.character_name,
            self.attribute,
            self.original.value,
            self.original.chapter_id,
            self.new.value,
            self.new.chapter_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(v: &str, chapter: &str) -> AttributeValue {
        AttributeValue {
            value: v.to_string(),
            chapter_id: DocumentId::new(chapter),
            position: 0,
        }
    }

    #[test]
    fn summary_lists_every_recorded_value() {
        let mut entry = CharacterEntry::new(Mention {
            chapter_id: DocumentId::new("ch-1"),
            position: 4,
        });
        entry.attributes.insert(
            "eye_color".into(),
            vec![value("blue", "ch-1"), value("green", "ch-2")],
        );
        let mut index = ManuscriptIndex::default();
        index.characters.insert("Elara".into(), entry);

        assert_eq!(index.summary(), "Elara: eye_color = blue (ch-1), green (ch-2)");
        assert_eq!(
            index.character(" Elara ").unwrap().latest("eye_color").unwrap().value,
            "green"
        );
    }

    #[test]
    fn contradiction_display_names_both_chapters() {
        let c = Contradiction {
            kind: ContradictionKind::Attribute,
            character_name: "Elara".into(),
            attribute: "eye_color".into(),
            original: value("blue", "ch-1"),
            new: value("green", "ch-2"),
        };
        assert_eq!(
            c.to_string(),
            "Elara's eye_color was \"blue\" in ch-1 but is \"green\" in ch-2"
        );
    }

    #[test]
    fn extraction_parses_with_missing_position() {
        let parsed: Extraction = serde_json::from_str(
            r#"{"characters":[{"name":"Bran","attributes":{"height":"tall"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.characters[0].position, 0);
        assert_eq!(parsed.characters[0].attributes["height"], "tall");
    }
}
