use std::process::ExitCode;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use chatforge::batch::evaluation::{EvaluationRequest, evaluate_dataset};
use chatforge::batch::generation::{DatasetRequest, generate_dataset};
use chatforge::cache::ReplayCache;
use chatforge::cli::{Cli, Command};
use chatforge::config::AppConfig;
use chatforge::gemini::GeminiClient;
use chatforge::logging::init_logging;
use chatforge::structured::StructuredClient;
use chatforge::ui::{self, BatchProgress};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }
    init_logging(&config.logging, cli.verbose)?;

    let run_id = Uuid::new_v4();
    let started = Utc::now();
    let span = info_span!("run", %run_id);
    async move {
        let cache = ReplayCache::new(&config.cache_dir);
        let provider = GeminiClient::with_base_url(
            config.require_api_key()?.to_string(),
            config.base_url.clone(),
            config.request_timeout(),
        )?;
        let mut client = StructuredClient::new(provider, config.client_settings());

        match cli.command {
            Command::Generate {
                count,
                seed,
                language,
                output,
                manifest,
                run,
            } => {
                let model = config.resolve_generation_model(cli.model.as_deref());
                let request = DatasetRequest {
                    count: usize::from(count),
                    seed,
                    language: language.unwrap_or_else(|| config.language.clone()),
                    output_path: output,
                    manifest_path: manifest,
                    options: run.into(),
                };
                info!(%model, count = request.count, seed, language = %request.language, "generating dataset");

                let progress = BatchProgress::start("generate");
                let result =
                    generate_dataset(&mut client, &cache, &model, &request, |event| progress.update(event)).await;
                match result {
                    Ok(summary) => progress.finish(
                        &summary,
                        &[("dataset", request.output_path.as_path()), ("manifest", request.manifest_path.as_path())],
                    ),
                    Err(err) => {
                        progress.abandon();
                        return Err(err.into());
                    }
                }
            }
            Command::Evaluate {
                input,
                output,
                seed,
                run,
            } => {
                if !input.is_file() {
                    anyhow::bail!("input dataset {} does not exist", input.display());
                }
                let model = config.resolve_evaluation_model(cli.model.as_deref());
                let request = EvaluationRequest {
                    input_path: input,
                    output_path: output,
                    seed,
                    options: run.into(),
                };
                info!(%model, input = %request.input_path.display(), seed, "evaluating dataset");

                let progress = BatchProgress::start("evaluate");
                let result =
                    evaluate_dataset(&mut client, &cache, &model, &request, |event| progress.update(event)).await;
                match result {
                    Ok(summary) => progress.finish(&summary, &[("report", request.output_path.as_path())]),
                    Err(err) => {
                        progress.abandon();
                        return Err(err.into());
                    }
                }
            }
        }

        info!(elapsed_ms = (Utc::now() - started).num_milliseconds(), "run finished");
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}
