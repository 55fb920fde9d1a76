//! Consulta RAG de diagnóstico de averías.
//!
//! Flujo:
//!   1. Embedding de la descripción de la avería.
//!   2. Búsqueda de las averías históricas más parecidas (filtrada por buque si procede).
//!   3. Construcción del contexto (o la frase centinela si no hay resultados).
//!   4. Prompt con el esqueleto de salida.
//!   5. Completion del LLM.
//!   6. Parseo tolerante de la respuesta.
//!
//! Cualquier `UpstreamError` lleva al estado `Failed` y la consulta devuelve
//! `{ "error": ... }`. Recuperaciones vacías y respuestas mal formadas no son fallos.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::{DiagnosisError, Stage, UpstreamError},
    models::{DiagnosisResponse, FaultQuery, QueryOutcome},
    parser::{self, ParsedDiagnosis},
    prompt,
    vector_store,
};

/// Lanza una consulta de diagnóstico y devuelve siempre una carga útil serializable.
pub async fn diagnose_fault(state: &AppState, query: &FaultQuery) -> QueryOutcome {
    let query_id = Uuid::new_v4();
    let span = tracing::info_span!("diagnose", %query_id, ship = %query.scope);

    async {
        info!("Nueva consulta de diagnóstico: '{}'", query.text);
        match run_pipeline(state, query).await {
            Ok(response) => {
                info!(
                    "Diagnóstico completado con {} averías similares",
                    response.similar_faults.len()
                );
                QueryOutcome::Diagnosis(response)
            }
            Err(err) => {
                error!("Consulta fallida: {err}");
                QueryOutcome::from_error(&err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Ejecuta la máquina de estados `Embedding → … → Done`.
pub async fn run_pipeline(
    state: &AppState,
    query: &FaultQuery,
) -> Result<DiagnosisResponse, DiagnosisError> {
    // Se comprueba en cada invocación, antes de cualquier llamada de red.
    state.config.require_credentials()?;

    let mut stage = Stage::Embedding;
    let result = run_stages(state, query, &mut stage).await;
    if result.is_err() {
        transition(&mut stage, Stage::Failed);
    }
    result
}

async fn run_stages(
    state: &AppState,
    query: &FaultQuery,
    stage: &mut Stage,
) -> Result<DiagnosisResponse, DiagnosisError> {
    let timeout = state.config.stage_timeout;

    transition(stage, Stage::Embedding);
    let vector = bounded(Stage::Embedding, timeout, state.embedder.embed(&query.text)).await?;

    transition(stage, Stage::Retrieving);
    let similar = bounded(
        Stage::Retrieving,
        timeout,
        vector_store::retrieve_similar_faults(state.index.as_ref(), &vector, &query.scope),
    )
    .await?;
    if similar.is_empty() {
        info!("Sin averías similares para el alcance '{}'", query.scope);
    }

    transition(stage, Stage::Assembling);
    let context = prompt::assemble_context(&similar);

    transition(stage, Stage::Prompting);
    let prompt_text = prompt::build_prompt(&query.text, &context);

    transition(stage, Stage::Completing);
    let raw = bounded(
        Stage::Completing,
        timeout,
        state.completer.complete(&prompt_text, state.config.llm_max_tokens),
    )
    .await?;

    transition(stage, Stage::Parsing);
    let parsed = parser::parse_completion(&raw, &query.text);
    if !parsed.is_complete() {
        warn!("Respuesta del LLM incompleta; secciones por defecto: {:?}", parsed.missing);
    }

    let status = status_for(&parsed, state.index.backend_name());
    transition(stage, Stage::Done);

    Ok(DiagnosisResponse {
        fault_title: parsed.title,
        diagnosis: parsed.diagnosis,
        troubleshooting_steps: parsed.troubleshooting_steps,
        recommended_actions: parsed.recommended_actions,
        similar_faults: similar,
        status,
    })
}

fn transition(current: &mut Stage, next: Stage) {
    debug!("Etapa {current} → {next}");
    *current = next;
}

/// Espera una etapa con red como mucho `limit`.
async fn bounded<T, F>(stage: Stage, limit: Duration, fut: F) -> Result<T, DiagnosisError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(DiagnosisError::from),
        Err(_) => Err(UpstreamError::Timeout { stage, limit }.into()),
    }
}

/// Etiqueta `status`: éxito completo, o parseo parcial indicando las secciones perdidas.
pub fn status_for(parsed: &ParsedDiagnosis, backend: &str) -> String {
    let base = format!("AI-powered response with {backend} similarity search");
    if parsed.is_complete() {
        base
    } else {
        let missing = parsed
            .missing
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{base} (best-effort parsing; missing: {missing})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Section;

    #[test]
    fn status_names_missing_sections() {
        let complete = ParsedDiagnosis::default();
        assert_eq!(
            status_for(&complete, "Pinecone"),
            "AI-powered response with Pinecone similarity search"
        );

        let partial = ParsedDiagnosis {
            missing: vec![Section::Title, Section::Actions],
            ..Default::default()
        };
        assert_eq!(
            status_for(&partial, "Neo4j"),
            "AI-powered response with Neo4j similarity search (best-effort parsing; missing: Title, Recommended Actions)"
        );
    }

    #[tokio::test]
    async fn bounded_turns_slow_stages_into_timeouts() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, UpstreamError>(())
        };
        let err = bounded(Stage::Completing, Duration::from_millis(10), slow)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DiagnosisError::Upstream(UpstreamError::Timeout {
                stage: Stage::Completing,
                limit: Duration::from_millis(10),
            })
        );
        assert_eq!(err.to_string(), "Error during AI query: completing timed out after 10ms.");
    }
}
