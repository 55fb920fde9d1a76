//! Extracción de las secciones del diagnóstico a partir del texto libre del LLM.
//!
//! El formato que pide el prompt es una convención, no una garantía. El parser
//! recorre el texto de arriba abajo, reconoce las etiquetas aunque vengan con
//! decoración markdown y degrada cada sección ausente a su valor por defecto.
//! Nunca falla.

use std::sync::OnceLock;

use regex::Regex;

/// Secciones reconocidas, en el orden del esqueleto del prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Title,
    Diagnosis,
    Troubleshooting,
    Actions,
}

impl Section {
    pub fn label(&self) -> &'static str {
        match self {
            Section::Title => "Title",
            Section::Diagnosis => "Diagnosis",
            Section::Troubleshooting => "Step-by-Step Troubleshooting",
            Section::Actions => "Recommended Actions",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        let normalized = label.to_lowercase();
        match normalized.as_str() {
            "title" => Some(Section::Title),
            "diagnosis" => Some(Section::Diagnosis),
            "step-by-step troubleshooting" => Some(Section::Troubleshooting),
            "recommended actions" => Some(Section::Actions),
            _ => None,
        }
    }
}

/// Diagnóstico estructurado más la lista de secciones que no se pudieron extraer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedDiagnosis {
    pub title: String,
    pub diagnosis: String,
    pub troubleshooting_steps: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub missing: Vec<Section>,
}

impl ParsedDiagnosis {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:#{1,6}\s*)?(?:\*\*|__)?\s*(title|diagnosis|step-by-step troubleshooting|recommended actions)\s*(?:\*\*|__)?\s*:\s*(?:\*\*|__)?\s*(.*?)\s*$",
        )
        .expect("regex de etiquetas válida")
    })
}

fn bullet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•]|\d{1,2}[.)])\s+(\S.*?)\s*$").expect("regex de viñetas válida")
    })
}

/// Cuerpo de una sección: resto de la línea de la etiqueta + líneas siguientes.
#[derive(Debug, Default)]
struct RawSection {
    inline: String,
    lines: Vec<String>,
}

/// Parsea la respuesta del modelo. `fault_text` se usa para el título por defecto.
pub fn parse_completion(raw: &str, fault_text: &str) -> ParsedDiagnosis {
    let mut sections: Vec<(Section, RawSection)> = Vec::new();
    // Índice de la sección abierta; `None` si la etiqueta era repetida o aún no hay ninguna.
    let mut current: Option<usize> = None;

    for line in raw.lines() {
        if let Some(caps) = label_regex().captures(line) {
            let section = caps.get(1).and_then(|m| Section::from_label(m.as_str()));
            if let Some(section) = section {
                if sections.iter().any(|(s, _)| *s == section) {
                    // La primera aparición manda; el cuerpo repetido se ignora.
                    current = None;
                } else {
                    let inline = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
                    sections.push((section, RawSection { inline, lines: Vec::new() }));
                    current = Some(sections.len() - 1);
                }
                continue;
            }
        }

        if let Some(idx) = current {
            sections[idx].1.lines.push(line.to_string());
        }
    }

    let find = |wanted: Section| sections.iter().find(|(s, _)| *s == wanted).map(|(_, raw)| raw);
    let mut missing = Vec::new();

    let title = match find(Section::Title).map(|raw| clean_inline(&raw.inline)) {
        Some(t) if !t.is_empty() => t,
        _ => {
            missing.push(Section::Title);
            format!("{fault_text} Diagnosis")
        }
    };

    let diagnosis = find(Section::Diagnosis).map(join_paragraph).unwrap_or_default();
    if diagnosis.is_empty() {
        missing.push(Section::Diagnosis);
    }

    let troubleshooting_steps = find(Section::Troubleshooting).map(bullets).unwrap_or_default();
    if troubleshooting_steps.is_empty() {
        missing.push(Section::Troubleshooting);
    }

    let recommended_actions = find(Section::Actions).map(bullets).unwrap_or_default();
    if recommended_actions.is_empty() {
        missing.push(Section::Actions);
    }

    ParsedDiagnosis {
        title,
        diagnosis,
        troubleshooting_steps,
        recommended_actions,
        missing,
    }
}

/// Quita un par `**…**` o `__…__` que envuelva todo el texto. Cualquier otra
/// decoración se conserva tal cual.
fn clean_inline(text: &str) -> String {
    let text = text.trim();
    for marker in ["**", "__"] {
        let inner = text.strip_prefix(marker).and_then(|t| t.strip_suffix(marker));
        if let Some(inner) = inner.map(str::trim).filter(|i| !i.is_empty()) {
            return inner.to_string();
        }
    }
    text.to_string()
}

/// Texto de la línea de la etiqueta y de las siguientes, unido en un párrafo.
fn join_paragraph(raw: &RawSection) -> String {
    std::iter::once(raw.inline.as_str())
        .chain(raw.lines.iter().map(String::as_str))
        .map(clean_inline)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Elementos con viñeta bajo la etiqueta; las líneas sin viñeta se descartan.
fn bullets(raw: &RawSection) -> Vec<String> {
    std::iter::once(raw.inline.as_str())
        .chain(raw.lines.iter().map(String::as_str))
        .filter_map(|line| bullet_regex().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| clean_inline(m.as_str())))
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "Title: Generator 2 cooler fouling\n\
Diagnosis: Overheating is most likely caused by a fouled LT cooler.\n\
Step-by-Step Troubleshooting:\n\
- Check LT cooling water inlet and outlet temperatures\n\
- Inspect cooler plates for fouling\n\
- Verify thermostatic valve operation\n\
Recommended Actions:\n\
- Clean the LT cooler\n\
- Schedule a cooler inspection at next port\n";

    #[test]
    fn parses_a_fully_labelled_reply() {
        let parsed = parse_completion(FULL, "Generator overheating alarm");

        assert_eq!(parsed.title, "Generator 2 cooler fouling");
        assert_eq!(parsed.diagnosis, "Overheating is most likely caused by a fouled LT cooler.");
        assert_eq!(
            parsed.troubleshooting_steps,
            vec![
                "Check LT cooling water inlet and outlet temperatures",
                "Inspect cooler plates for fouling",
                "Verify thermostatic valve operation",
            ]
        );
        assert_eq!(
            parsed.recommended_actions,
            vec!["Clean the LT cooler", "Schedule a cooler inspection at next port"]
        );
        assert!(parsed.is_complete());
    }

    #[test]
    fn missing_trailing_section_degrades_to_empty() {
        let reply = FULL.split("Recommended Actions:").next().unwrap();
        let parsed = parse_completion(reply, "Generator overheating alarm");

        assert_eq!(parsed.title, "Generator 2 cooler fouling");
        assert!(!parsed.diagnosis.is_empty());
        assert_eq!(parsed.troubleshooting_steps.len(), 3);
        assert!(parsed.recommended_actions.is_empty());
        assert_eq!(parsed.missing, vec![Section::Actions]);
    }

    #[test]
    fn unlabelled_reply_falls_back_everywhere() {
        let parsed = parse_completion(
            "The generator is probably overheating.\n- maybe clean something",
            "Generator overheating alarm",
        );

        assert_eq!(parsed.title, "Generator overheating alarm Diagnosis");
        assert_eq!(parsed.diagnosis, "");
        assert!(parsed.troubleshooting_steps.is_empty());
        assert!(parsed.recommended_actions.is_empty());
        assert_eq!(parsed.missing.len(), 4);
    }

    #[test]
    fn empty_reply_never_panics() {
        let parsed = parse_completion("", "Bilge alarm");
        assert_eq!(parsed.title, "Bilge alarm Diagnosis");
    }

    #[test]
    fn tolerates_markdown_decoration_and_case() {
        let reply = "**Title:** Purifier bowl leak\n\
### diagnosis: Worn bowl seal.\n\
**Step-by-Step Troubleshooting**:\n\
1. Stop the purifier\n\
2) Open the bowl\n\
RECOMMENDED ACTIONS:\n\
* Replace the seal ring\n\
• Log the repair\n";
        let parsed = parse_completion(reply, "Purifier leak");

        assert_eq!(parsed.title, "Purifier bowl leak");
        assert_eq!(parsed.diagnosis, "Worn bowl seal.");
        assert_eq!(parsed.troubleshooting_steps, vec!["Stop the purifier", "Open the bowl"]);
        assert_eq!(parsed.recommended_actions, vec!["Replace the seal ring", "Log the repair"]);
    }

    #[test]
    fn multi_line_diagnosis_stops_at_next_label() {
        let reply = "Title: Boiler flame failure\n\
Diagnosis: Flame scanner fouled.\n\
Soot build-up confirmed in previous events.\n\
Recommended Actions:\n\
- Clean the flame scanner\n";
        let parsed = parse_completion(reply, "Boiler trip");

        assert_eq!(
            parsed.diagnosis,
            "Flame scanner fouled. Soot build-up confirmed in previous events."
        );
        assert!(parsed.troubleshooting_steps.is_empty());
        assert_eq!(parsed.recommended_actions, vec!["Clean the flame scanner"]);
    }

    #[test]
    fn empty_title_falls_back_and_duplicates_are_ignored() {
        let reply = "Title:\n\
Diagnosis: Low lube oil pressure.\n\
Diagnosis: Something else entirely.\n\
- not a diagnosis bullet\n";
        let parsed = parse_completion(reply, "ME lube oil alarm");

        assert_eq!(parsed.title, "ME lube oil alarm Diagnosis");
        assert_eq!(parsed.diagnosis, "Low lube oil pressure.");
        assert!(parsed.missing.contains(&Section::Title));
    }

    #[test]
    fn non_bullet_lines_inside_lists_are_skipped() {
        let reply = "Recommended Actions:\n\
Please consider the following:\n\
- Replace the fuel filter\n\
\n\
- Bleed the fuel system\n";
        let parsed = parse_completion(reply, "Fuel pressure low");
        assert_eq!(parsed.recommended_actions, vec!["Replace the fuel filter", "Bleed the fuel system"]);
    }

    #[test]
    fn bold_words_inside_items_are_kept() {
        let reply = "Recommended Actions:\n\
- **Clean** the LT cooler\n\
- __Replace the thermostat__\n\
- Check the *expansion tank* level\n";
        let parsed = parse_completion(reply, "Generator overheating alarm");
        assert_eq!(
            parsed.recommended_actions,
            vec!["**Clean** the LT cooler", "Replace the thermostat", "Check the *expansion tank* level"]
        );
    }

    #[test]
    fn rules_and_bold_paragraphs_are_not_bullets() {
        let reply = "Recommended Actions:\n\
- Clean the LT cooler\n\
---\n\
**Note:** monitor temperatures\n\
1.5 bar is the expected pressure\n\
2. Log the repair\n";
        let parsed = parse_completion(reply, "Generator overheating alarm");
        assert_eq!(parsed.recommended_actions, vec!["Clean the LT cooler", "Log the repair"]);
    }
}
