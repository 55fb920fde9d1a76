//! Construcción del contexto y del prompt de diagnóstico.
//!
//! Las etiquetas de sección que aparecen aquí son las mismas que busca
//! `parser`: si cambian en un sitio, deben cambiar en el otro.

use crate::models::RetrievalResult;

/// Contexto cuando no hay averías parecidas. Nunca se envía un bloque vacío.
pub const NO_SIMILAR_FAULTS: &str = "No similar faults found.";

pub const TITLE_LABEL: &str = "Title:";
pub const DIAGNOSIS_LABEL: &str = "Diagnosis:";
pub const TROUBLESHOOTING_LABEL: &str = "Step-by-Step Troubleshooting:";
pub const ACTIONS_LABEL: &str = "Recommended Actions:";

/// Una línea por avería: `Equipment: … | Fault: … | Cause: … | Resolution: …`.
pub fn assemble_context(similar: &RetrievalResult) -> String {
    if similar.is_empty() {
        return NO_SIMILAR_FAULTS.to_string();
    }

    similar
        .iter()
        .map(|f| {
            format!(
                "Equipment: {} | Fault: {} | Cause: {} | Resolution: {}",
                f.record.equipment, f.record.fault, f.record.cause, f.record.resolution
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt completo para el modelo generativo, con el esqueleto de salida exigido.
pub fn build_prompt(fault_text: &str, context: &str) -> String {
    // Un contexto vacío sería indistinguible de un fallo de formato.
    let context = if context.trim().is_empty() {
        NO_SIMILAR_FAULTS
    } else {
        context
    };

    format!(
        "You are a maritime fault diagnosis expert assisting ship engineers.\n\
         Ground your answer only in the fault description and the similar past faults below. \
         If they are not enough to reach a conclusion, say so in the diagnosis instead of guessing.\n\
         \n\
         Fault description: '{fault_text}'\n\
         Similar past faults:\n\
         {context}\n\
         \n\
         Reply exactly in this format:\n\
         {TITLE_LABEL} [short fault diagnosis title]\n\
         {DIAGNOSIS_LABEL} [single sentence]\n\
         {TROUBLESHOOTING_LABEL}\n\
         - [step 1]\n\
         - [step 2]\n\
         - [step 3]\n\
         {ACTIONS_LABEL}\n\
         - [action 1]\n\
         - [action 2]\n\
         - [action 3]\n\
         \n\
         Do not add any other sections, and do not include content unrelated to this fault.\n"
    )
}
