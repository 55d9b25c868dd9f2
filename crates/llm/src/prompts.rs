//! Prompt builders.  Every prompt that expects structured output asks for a
//! single fenced JSON block so [`crate::extract_json_output`] can parse it.

use quill_core::Setting;

use crate::{HelpKind, RewriteMode};

fn setting_block(setting: Option<&Setting>) -> String {
    match setting {
        Some(s) if !s.is_empty() => format!(
            "\nThe story is set in {} ({}). Keep details consistent with that setting.\n",
            s.location.trim(),
            s.time_period.trim()
        ),
        _ => String::new(),
    }
}

pub fn analysis_prompt(text: &str, setting: Option<&Setting>, lore: Option<&str>) -> String {
    let lore_block = match lore {
        Some(l) if !l.trim().is_empty() => {
            format!("\nKnown facts from other chapters:\n{}\n", l.trim())
        }
        _ => String::new(),
    };
    format!(
        "You are a developmental editor. Analyse the chapter below.{setting}{lore_block}\n\
         Reply with one ```json block of the form\n\
         {{\"summary\": string, \"strengths\": [string], \"weaknesses\": [string], \
         \"pacing_score\": number (0-10), \
         \"issues\": [{{\"quote\": exact text from the chapter, \"issue\": string, \"suggestion\": string}}]}}\n\n\
         Chapter:\n{text}",
        setting = setting_block(setting),
    )
}

pub fn rewrite_prompt(
    text: &str,
    mode: RewriteMode,
    tone: Option<&str>,
    setting: Option<&Setting>,
) -> String {
    let instruction = match mode {
        RewriteMode::Clarify => "Make the passage clearer without changing its meaning.".to_string(),
        RewriteMode::Tighten => "Cut redundancy and filler; keep every beat.".to_string(),
        RewriteMode::Expand => "Expand the passage with sensory detail and interiority.".to_string(),
        RewriteMode::ShowDontTell => {
            "Replace stated emotions and summaries with concrete action and detail.".to_string()
        }
        RewriteMode::DialogueDoctor => {
            "Make the dialogue sound natural and give each speaker a distinct voice.".to_string()
        }
        RewriteMode::ToneTuner => format!(
            "Rewrite the passage with a {} tone.",
            tone.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("neutral")
        ),
    };
    format!(
        "You are a line editor. {instruction}{setting}\n\
         Offer three alternatives. Reply with one ```json block of the form \
         {{\"variations\": [string, string, string]}}.\n\nPassage:\n{text}",
        setting = setting_block(setting),
    )
}

pub fn help_prompt(text: &str, kind: HelpKind) -> String {
    match kind {
        HelpKind::Define => format!(
            "Give a short dictionary-style definition of \"{}\". Plain text, two sentences at most.",
            text.trim()
        ),
        HelpKind::Explain => format!(
            "Explain the following passage to a writer in plain language, in one short paragraph:\n\n{}",
            text.trim()
        ),
    }
}

pub fn extraction_prompt(text: &str) -> String {
    format!(
        "List every named character in the chapter below with the physical and \
         biographical attributes stated about them (e.g. eye_color, hair_color, age, \
         home). Use snake_case attribute names. Reply with one ```json block of the form\n\
         {{\"characters\": [{{\"name\": string, \"attributes\": {{string: string}}, \
         \"position\": byte offset of the first mention}}]}}\n\nChapter:\n{text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_tuner_uses_requested_tone() {
        let prompt = rewrite_prompt("She left.", RewriteMode::ToneTuner, Some(" wry "), None);
        assert!(prompt.contains("with a wry tone"));
        let fallback = rewrite_prompt("She left.", RewriteMode::ToneTuner, None, None);
        assert!(fallback.contains("with a neutral tone"));
    }

    #[test]
    fn setting_is_included_only_when_present() {
        let setting = Setting {
            time_period: "1890s".into(),
            location: "Lisbon".into(),
        };
        let with = analysis_prompt("text", Some(&setting), None);
        assert!(with.contains("set in Lisbon (1890s)"));
        let without = analysis_prompt("text", Some(&Setting::default()), None);
        assert!(!without.contains("set in"));
    }

    #[test]
    fn analysis_includes_lore() {
        let prompt = analysis_prompt("text", None, Some("Elara: eye_color = blue (ch-1)"));
        assert!(prompt.contains("Known facts from other chapters"));
        assert!(prompt.contains("Elara: eye_color = blue"));
    }
}
