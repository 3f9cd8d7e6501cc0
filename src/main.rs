use insight_dash::config::DashboardConfig;
use insight_dash::geo;
use insight_dash::llm::{LlmClient, SpecOracle};
use insight_dash::pipeline::DashboardPipeline;
use insight_dash::query_spec::Filter;
use insight_dash::row_source::{load_csv, RestRowSource, RowSource};
use insight_dash::{filter_normalizer, spec_validator};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "insight-dash")]
#[command(about = "Natural-language questions over a sales fact table")]
#[command(version)]
struct Args {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question and print the result bundle as JSON
    Ask {
        /// The question in natural language
        question: String,

        /// Read fact rows from a CSV export instead of the REST source
        #[arg(long)]
        csv: Option<PathBuf>,

        /// OpenAI API key (or set OPENAI_API_KEY env var)
        #[arg(long)]
        api_key: Option<String>,

        /// Skip the LLM and use the rule-based parser
        #[arg(long)]
        offline: bool,
    },
    /// Derive country/market from a location token
    Derive {
        token: String,
    },
    /// Normalize a JSON array of filter clauses
    Normalize {
        filters: String,
    },
    /// Validate a candidate spec (JSON) for a question
    Validate {
        question: String,

        /// Candidate spec; omitted means the oracle produced nothing
        #[arg(long)]
        spec: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.json_logs);

    match args.command {
        Commands::Ask {
            question,
            csv,
            api_key,
            offline,
        } => run_ask(question, csv, api_key, offline).await,
        Commands::Derive { token } => {
            println!("{}", serde_json::to_string_pretty(&geo::derive(&token))?);
            Ok(())
        }
        Commands::Normalize { filters } => {
            let filters: Vec<Filter> = serde_json::from_str(&filters)?;
            let normalized = filter_normalizer::normalize(&filters);
            println!("{}", serde_json::to_string_pretty(&normalized)?);
            Ok(())
        }
        Commands::Validate { question, spec } => {
            let validated = spec_validator::validate_response(spec.as_deref(), &question);
            println!("{}", serde_json::to_string_pretty(&validated)?);
            Ok(())
        }
    }
}

async fn run_ask(
    question: String,
    csv: Option<PathBuf>,
    api_key: Option<String>,
    offline: bool,
) -> Result<()> {
    let mut config = DashboardConfig::from_env()?;
    if api_key.is_some() {
        config.openai_api_key = api_key;
    }

    let source: Arc<dyn RowSource> = match csv {
        Some(path) => Arc::new(load_csv(&path)?),
        None => {
            let url = config
                .supabase_url
                .clone()
                .ok_or_else(|| {
                    anyhow!("SUPABASE_URL is not set; pass --csv to read a file instead")
                })?;
            let key = config
                .supabase_key
                .clone()
                .ok_or_else(|| anyhow!("SUPABASE_KEY is not set"))?;
            Arc::new(RestRowSource::new(url, key, config.sales_table.clone()))
        }
    };

    let mut pipeline = DashboardPipeline::new(source, &config);
    match (&config.openai_api_key, offline) {
        (Some(key), false) => {
            let client = LlmClient::new(
                key.clone(),
                config.llm_model.clone(),
                config.llm_base_url.clone(),
            );
            info!("Using LLM model {}", client.model());
            let oracle: Arc<dyn SpecOracle> = Arc::new(client);
            pipeline = pipeline.with_oracle(oracle);
        }
        _ => info!("No LLM configured, using rule-based parser"),
    }

    let bundle = pipeline.ask(&question).await?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}
