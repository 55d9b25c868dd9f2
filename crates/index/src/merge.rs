use std::collections::btree_map::Entry;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

use quill_core::{
    AttributeValue, CharacterEntry, Contradiction, ContradictionKind, DocumentId, Extraction,
    ManuscriptIndex, Mention,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub index: ManuscriptIndex,
    pub contradictions: Vec<Contradiction>,
}

/// Fold one chapter's extraction into a copy of `existing`.
///
/// Values are only ever appended.  Every earlier value of the same attribute
/// that differs from the new one (case-insensitive, trimmed) yields its own
/// [`Contradiction`].  Merging the same extraction twice appends duplicate
/// mentions; callers gate on [`content_hash`] to stay idempotent.
pub fn merge(
    existing: &ManuscriptIndex,
    extraction: &Extraction,
    chapter_id: &DocumentId,
) -> MergeOutcome {
    let mut index = existing.clone();
    let contradictions = merge_into(&mut index, extraction, chapter_id);
    MergeOutcome {
        index,
        contradictions,
    }
}

/// In-place variant of [`merge`].
pub fn merge_into(
    index: &mut ManuscriptIndex,
    extraction: &Extraction,
    chapter_id: &DocumentId,
) -> Vec<Contradiction> {
    let mut contradictions = Vec::new();

    for character in &extraction.characters {
        let name = character.name.trim();
        if name.is_empty() {
            continue;
        }

        let mention = Mention {
            chapter_id: chapter_id.clone(),
            position: character.position,
        };
        let entry = match index.characters.entry(name.to_string()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                entry.mentions.push(mention);
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(CharacterEntry::new(mention)),
        };

        for (attribute, value) in &character.attributes {
            let attribute = attribute.trim();
            let value = value.trim();
            if attribute.is_empty() || value.is_empty() {
                continue;
            }

            let new_value = AttributeValue {
                value: value.to_string(),
                chapter_id: chapter_id.clone(),
                position: character.position,
            };
            let recorded = entry.attributes.entry(attribute.to_string()).or_default();
            let normalized = value.to_lowercase();
            for prior in recorded.iter() {
                if prior.value.trim().to_lowercase() != normalized {
                    contradictions.push(Contradiction {
                        kind: ContradictionKind::Attribute,
                        character_name: name.to_string(),
                        attribute: attribute.to_string(),
                        original: prior.clone(),
                        new: new_value.clone(),
                    });
                }
            }
            recorded.push(new_value);
        }
    }

    index.last_updated.insert(chapter_id.clone(), Utc::now());
    debug!(
        chapter = %chapter_id,
        characters = extraction.characters.len(),
        contradictions = contradictions.len(),
        "merged extraction"
    );
    contradictions
}

/// SHA-256 hex digest of a chapter's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
