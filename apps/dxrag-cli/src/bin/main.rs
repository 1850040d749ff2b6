use clap::{Args, Parser, Subcommand};
use std::env;
use tracing_subscriber::EnvFilter;

use dxrag_clinical::{build_retriever, DiagnoseRequest, Engine, LlmProvider, PipelineMode, RECOMMENDATIONS};
use dxrag_core::config::{Config, Settings};
use dxrag_vector::IndexManager;

#[derive(Parser)]
#[command(name = "dxrag", version, about = "Clinical reference retrieval and diagnostic reasoning")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the document index, or reuse it if the corpus is unchanged
    Index {
        /// Rebuild even when the fingerprint matches
        #[arg(long)]
        force: bool,
    },
    /// Print the context block retrieved for a query
    Retrieve { query: String },
    /// Run a full diagnosis
    Diagnose(DiagnoseArgs),
    /// List providers, default models and recommendations
    Models,
}

#[derive(Args)]
struct DiagnoseArgs {
    symptoms: String,
    #[arg(long, default_value = "default")]
    session: String,
    /// Patient field override, e.g. --set age=45 --set allergies="penicillin, sulfa"
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_key_val)]
    overrides: Vec<(String, String)>,
    #[arg(long, conflicts_with = "no_web")]
    web: bool,
    #[arg(long)]
    no_web: bool,
    #[arg(long)]
    single_shot: bool,
    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s.split_once('=').ok_or_else(|| format!("expected FIELD=VALUE, got '{s}'"))?;
    Ok((k.trim().to_string(), v.trim().to_string()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    tokio::runtime::Runtime::new()?.block_on(run(cli.command, settings))
}

async fn run(command: Command, settings: Settings) -> anyhow::Result<()> {
    match command {
        Command::Index { force } => {
            let manager = IndexManager::new(&settings);
            let (docs, index) = (&settings.data.docs_dir, &settings.data.index_dir);
            let loaded = if force { manager.rebuild(docs, index).await } else { manager.load_or_build(docs, index).await };
            let loaded = loaded.map_err(corpus_hint)?;
            println!("✅ Index ready ({:?}, {} chunks) at {}", loaded.origin, loaded.index.len(), index.display());
        }
        Command::Retrieve { query } => {
            let retriever = build_retriever(&settings).await.map_err(corpus_hint)?;
            println!("Backends: {}\n", retriever.description());
            println!("{}", retriever.retrieve_context(&query).await?);
        }
        Command::Diagnose(args) => {
            let mut engine = Engine::from_settings(&settings, None).await.map_err(corpus_hint)?;
            if args.single_shot {
                engine = engine.with_mode(PipelineMode::SingleShot);
            }
            let mut request = DiagnoseRequest::new(args.symptoms).session(args.session);
            request.patient_overrides = args.overrides;
            if args.web {
                request = request.web_search(true);
            } else if args.no_web {
                request = request.web_search(false);
            }
            let result = engine.diagnose(request).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}\n", result.report);
                println!(
                    "provider {}/{} | pipeline {} | retrieval {} | documents {} | web {}",
                    result.provider,
                    result.model,
                    result.pipeline,
                    result.retrieval,
                    if result.document_context_used { "yes" } else { "no" },
                    if result.web_search_used { "yes" } else { "no" },
                );
            }
        }
        Command::Models => {
            println!("Providers (configured: {}):", settings.llm.provider);
            for provider in LlmProvider::ALL {
                let key = if env::var(provider.api_key_env()).is_ok() { "set" } else { "missing" };
                println!("  {:<10} default {:<26} {} {}", provider, provider.default_model(), provider.api_key_env(), key);
            }
            println!("\nRecommendations:");
            for r in RECOMMENDATIONS {
                println!("  {:<17} {}/{}: {}", r.use_case, r.provider, r.model, r.description);
            }
        }
    }
    Ok(())
}

/// Corpus problems get a hint about where documents belong.
fn corpus_hint(e: dxrag_core::error::Error) -> anyhow::Error {
    if e.is_corpus_unavailable() {
        eprintln!("💡 Put PDF, TXT or MD reference files in the docs directory (data.docs_dir) and retry.");
    }
    e.into()
}
