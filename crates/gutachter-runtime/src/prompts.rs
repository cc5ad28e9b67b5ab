//! Prompt construction for judge calls.
//!
//! Every builder embeds the input text and the scheme's criteria and asks
//! for a single strict-JSON answer. Scheme internals the judge has no
//! business seeing (weights, aggregator settings, output ranges) are never
//! included.

use std::fmt::Write;

use gutachter_core::gate::applicable_rules;
use gutachter_core::{BinaryGate, ChecklistAdditive, ContextType, OrdinalRubric, Scheme};

/// Shared system prompt. The judge is framed as an assessor executing
/// pre-defined criteria, not an opinion source; answers must be bare JSON.
pub const SYSTEM_PROMPT: &str = "\
Sie sind ein unabhängiger Gutachter für Bildungsinhalte. \
Sie bewerten ausschließlich anhand der vorgegebenen Kriterien und erfinden keine eigenen. \
Begründungen formulieren Sie knapp auf Deutsch. \
Antworten Sie ausschließlich mit einem einzigen JSON-Objekt, ohne Markdown, ohne weiteren Text.";

/// Gate prompt over the scope-filtered rules.
///
/// Requested answer shape: `{ "<rule_id>": {"triggered": bool, "reasoning": str} }`.
pub fn gate_prompt(text: &str, scheme: &Scheme, gate: &BinaryGate, context: ContextType) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Prüfen Sie den folgenden Text auf {}: {}\n",
        scheme.name, scheme.description
    );
    let _ = writeln!(prompt, "Text:\n{text}\n");
    let _ = writeln!(prompt, "Prüfen Sie jede der folgenden Regeln einzeln:");

    for rule in applicable_rules(gate, context) {
        let _ = writeln!(prompt, "- Regel `{}`: {}", rule.id, rule.description);
        if !rule.trigger_keywords.is_empty() {
            let _ = writeln!(
                prompt,
                "  Hinweise auf einen Verstoß: {}",
                rule.trigger_keywords.join(", ")
            );
        }
        if !rule.not_trigger_keywords.is_empty() {
            let _ = writeln!(
                prompt,
                "  Kein Verstoß bei: {}",
                rule.not_trigger_keywords.join(", ")
            );
        }
        if let Some(hint) = &rule.evaluation_hint {
            let _ = writeln!(prompt, "  Bewertungshinweis: {hint}");
        }
    }

    let _ = writeln!(
        prompt,
        "\nAntworten Sie mit einem JSON-Objekt, das für jede Regel-ID ein Objekt \
{{\"triggered\": true|false, \"reasoning\": \"...\"}} enthält. \
`triggered` ist true, wenn die Regel verletzt ist."
    );
    prompt
}

/// Checklist prompt rating every item in one call.
///
/// Requested answer shape: `{ "<item_id>": {"level": int|"na", "reasoning": str} }`.
pub fn checklist_prompt(text: &str, scheme: &Scheme, checklist: &ChecklistAdditive) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Bewerten Sie den folgenden Text anhand einer Checkliste für die Dimension {}.\n",
        scheme.dimension
    );
    let _ = writeln!(prompt, "Text:\n{text}\n");
    let _ = writeln!(prompt, "Kriterien:");

    for item in &checklist.items {
        let _ = writeln!(prompt, "- Kriterium `{}`: {}", item.id, item.prompt);
        for (level, spec) in &item.values {
            if spec.description.is_empty() {
                let _ = writeln!(prompt, "  Stufe {level}");
            } else {
                let _ = writeln!(prompt, "  Stufe {level}: {}", spec.description);
            }
        }
        if item.allow_na {
            let _ = writeln!(prompt, "  \"na\", falls nicht anwendbar");
        }
    }

    let _ = writeln!(
        prompt,
        "\nAntworten Sie mit einem JSON-Objekt, das für jede Kriterium-ID ein Objekt \
{{\"level\": <Stufennummer>, \"reasoning\": \"...\"}} enthält. \
Verwenden Sie \"na\" als level nur, wenn das Kriterium nicht anwendbar ist."
    );
    prompt
}

/// Ordinal rubric prompt; anchors are presented top-down as declared.
///
/// Requested answer shape: `{"value": int, "reasoning": str, "confidence": number}`.
pub fn ordinal_prompt(text: &str, scheme: &Scheme, rubric: &OrdinalRubric) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Bewerten Sie den folgenden Text anhand dieser Rubrik für die Dimension {}.\n",
        scheme.dimension
    );
    let _ = writeln!(prompt, "Text:\n{text}\n");
    let _ = writeln!(prompt, "Stufen (von bester zu schlechtester):");

    for anchor in &rubric.anchors {
        if anchor.criteria.is_empty() {
            let _ = writeln!(prompt, "- Stufe {}: {}", anchor.value, anchor.label);
        } else {
            let _ = writeln!(
                prompt,
                "- Stufe {}: {} - {}",
                anchor.value, anchor.label, anchor.criteria
            );
        }
    }

    let _ = writeln!(
        prompt,
        "\nWählen Sie genau eine Stufe. Antworten Sie mit einem JSON-Objekt \
{{\"value\": <Stufennummer>, \"reasoning\": \"...\", \"confidence\": <0.0-1.0>}}."
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use gutachter_core::SchemeKind;

    fn gate_scheme() -> Scheme {
        serde_yaml::from_str(
            r#"
id: jugendschutz_gate
name: "Jugendschutz"
description: "Jugendschutzrechtliche Zulässigkeit"
dimension: jugendschutz
type: binary_gate
output_range: {min: 0, max: 1, type: boolean}
gate_rules:
  - {id: inhalt_regel, description: "Entwicklungsbeeinträchtigende Inhalte", scope: content,
     trigger_keywords: ["Gewaltverherrlichung"], evaluation_hint: "Kontext der Darstellung beachten"}
  - {id: plattform_regel, description: "Fehlende Alterskennzeichnung", scope: platform}
  - {id: beide_regel, description: "Unzulässige Angebote nach § 4 JMStV", scope: both}
"#,
        )
        .unwrap()
    }

    #[test]
    fn gate_prompt_contains_exactly_the_scoped_rules() {
        let scheme = gate_scheme();
        let SchemeKind::BinaryGate(gate) = &scheme.kind else {
            panic!("expected gate");
        };

        let content = gate_prompt("Beispieltext", &scheme, gate, ContextType::Content);
        assert!(content.contains("inhalt_regel"));
        assert!(content.contains("beide_regel"));
        assert!(!content.contains("plattform_regel"));

        let platform = gate_prompt("Beispieltext", &scheme, gate, ContextType::Platform);
        assert!(!platform.contains("inhalt_regel"));
        assert!(platform.contains("plattform_regel"));
        assert!(platform.contains("beide_regel"));

        let both = gate_prompt("Beispieltext", &scheme, gate, ContextType::Both);
        for id in ["inhalt_regel", "plattform_regel", "beide_regel"] {
            assert!(both.contains(id));
        }
    }

    #[test]
    fn gate_prompt_carries_keywords_and_hints() {
        let scheme = gate_scheme();
        let SchemeKind::BinaryGate(gate) = &scheme.kind else {
            panic!("expected gate");
        };
        let prompt = gate_prompt("Text", &scheme, gate, ContextType::Content);
        assert!(prompt.contains("Gewaltverherrlichung"));
        assert!(prompt.contains("Kontext der Darstellung beachten"));
    }

    #[test]
    fn checklist_prompt_hides_weights() {
        let scheme: Scheme = serde_yaml::from_str(
            r#"
id: neutralitaet_new
name: "Neutralität"
dimension: neutrality
type: checklist_additive
aggregator: {scale_factor: 5.0}
items:
  - id: perspektivenvielfalt
    prompt: "Werden mehrere Perspektiven dargestellt?"
    weight: 2.0
    allow_na: true
    values:
      1: {score: 0.0, description: "Nur eine Perspektive"}
      4: {score: 1.0, description: "Ausgewogen"}
"#,
        )
        .unwrap();
        let SchemeKind::ChecklistAdditive(checklist) = &scheme.kind else {
            panic!("expected checklist");
        };
        let prompt = checklist_prompt("Text", &scheme, checklist);
        assert!(prompt.contains("perspektivenvielfalt"));
        assert!(prompt.contains("Nur eine Perspektive"));
        assert!(prompt.contains("\"na\""));
        // Aggregation internals stay out of the prompt.
        assert!(!prompt.contains("2.0"));
        assert!(!prompt.contains("5.0"));
    }

    #[test]
    fn ordinal_prompt_lists_anchors_top_down() {
        let scheme: Scheme = serde_yaml::from_str(
            r#"
id: neutralitaet_old
name: "Neutralität"
dimension: neutrality
type: ordinal_rubric
output_range: {min: 0, max: 5, type: int}
anchors:
  - {value: 5, label: "Vollständig neutral", criteria: "Keine Wertung"}
  - {value: 1, label: "Stark gefärbt", criteria: "Durchgehend wertend"}
"#,
        )
        .unwrap();
        let SchemeKind::OrdinalRubric(rubric) = &scheme.kind else {
            panic!("expected rubric");
        };
        let prompt = ordinal_prompt("Text", &scheme, rubric);
        let five = prompt.find("Stufe 5").unwrap();
        let one = prompt.find("Stufe 1").unwrap();
        assert!(five < one);
        assert!(prompt.contains("confidence"));
    }
}
