use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vectorscan_fault_rag::{config::AppConfig, diagnose_fault, AppState, FaultQuery, QueryOutcome};

/// Diagnóstico de averías a bordo a partir de averías históricas similares.
#[derive(Debug, Parser)]
#[command(name = "vectorscan", version, about)]
struct Cli {
    /// Buque al que se restringe la búsqueda ("all" o ausente: toda la flota)
    #[arg(long, short)]
    ship: Option<String>,

    /// Salida JSON indentada
    #[arg(long)]
    pretty: bool,

    /// Descripción libre de la avería
    #[arg(required = true, num_args = 1..)]
    fault: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging (a stderr: stdout queda para el JSON)
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // 2. Cargar configuración y construir los clientes una sola vez
    let cfg = AppConfig::from_env()?;
    info!(
        "Índice vectorial: {} | modelo de embeddings: {} | modelo de chat: {}",
        cfg.index_provider.label(),
        cfg.llm_embedding_model,
        cfg.llm_chat_model
    );
    let state = AppState::from_config(cfg)?;

    // 3. Ejecutar la consulta
    let outcome = match FaultQuery::new(&cli.fault.join(" "), cli.ship.as_deref()) {
        Ok(query) => diagnose_fault(&state, &query).await,
        Err(err) => QueryOutcome::from_error(&err),
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{json}");

    if outcome.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
