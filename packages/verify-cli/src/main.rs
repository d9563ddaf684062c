//! Verify CLI
//!
//! Runs one claim check against the real providers and streams its
//! progress to the terminal.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use verification::{
    CheckRequest, CheckResult, CheckStatus, HttpFetcher, HttpNliClassifier, HttpOcrService,
    HttpTranscriptService, InputType, MemoryCache, Mode, OcrService, OpenAi, Pipeline,
    ProgressEvent, ProviderError, ProviderResult, RateLimitedSearcher, ServiceCredentials,
    Services, TavilySearcher, TranscriptService, Verdict,
};

use crate::config::{load_pipeline_config, Config};

#[derive(Parser, Debug)]
#[command(name = "verify", about = "Check the factual claims in a piece of content")]
struct Args {
    /// Kind of content in PAYLOAD
    #[arg(value_enum)]
    input: InputArg,

    /// URL, raw text, or image/video reference
    payload: String,

    /// Verification depth
    #[arg(long, value_enum, default_value_t = ModeArg::Quick)]
    mode: ModeArg,

    /// JSON file overriding pipeline defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print only the final result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InputArg {
    Url,
    Text,
    Image,
    Video,
}

impl From<InputArg> for InputType {
    fn from(arg: InputArg) -> Self {
        match arg {
            InputArg::Url => InputType::Url,
            InputArg::Text => InputType::Text,
            InputArg::Image => InputType::Image,
            InputArg::Video => InputType::Video,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Quick,
    Deep,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Quick => Mode::Quick,
            ModeArg::Deep => Mode::Deep,
        }
    }
}

/// Stands in for an OCR or transcript service with no endpoint configured.
struct Disabled(&'static str);

#[async_trait]
impl OcrService for Disabled {
    async fn extract_text(&self, _reference: &str) -> ProviderResult<String> {
        Err(ProviderError::Unavailable(format!("{} is not set", self.0)))
    }
}

#[async_trait]
impl TranscriptService for Disabled {
    async fn fetch_transcript(&self, _video_url: &str) -> ProviderResult<Option<String>> {
        Err(ProviderError::Unavailable(format!("{} is not set", self.0)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,verification=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();

    let env = Config::from_env()?;
    let pipeline_config = load_pipeline_config(args.config.as_deref())?;
    let services = build_services(&env, &pipeline_config)?;
    let pipeline = Pipeline::new(services, pipeline_config);

    let request = CheckRequest::new(args.input.into(), args.payload, "cli")
        .with_mode(args.mode.into());
    tracing::info!(check_id = %request.id, input_type = request.input_type.as_str(), "Starting check");

    let mut handle = pipeline.spawn(request);
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling check");
            cancel.cancel();
        }
    });

    let mut events = handle.events();
    while let Some(event) = events.next().await {
        if !args.json {
            print_progress(&event);
        }
    }

    let result = handle.result().await.context("Pipeline task panicked")?;
    if !args.json {
        print_summary(&result);
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    );

    if result.status == CheckStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn build_services(env: &Config, config: &verification::PipelineConfig) -> Result<Services> {
    let mut openai = OpenAi::new(env.openai_api_key.clone());
    if let Some(model) = &env.openai_model {
        openai = openai.with_model(model.clone());
    }
    let openai = Arc::new(openai);

    let fetcher = HttpFetcher::new(Duration::from_millis(config.timeouts.call_ms))
        .context("Failed to build HTTP client")?
        .with_max_bytes(config.max_input_bytes);

    let searcher = RateLimitedSearcher::new(
        TavilySearcher::new(env.tavily_api_key.clone()),
        env.search_requests_per_second.max(1),
    );

    let mut nli = ServiceCredentials::new(env.nli_endpoint.clone());
    if let Some(token) = &env.nli_token {
        nli = nli.with_token(token.clone());
    }

    let ocr: Arc<dyn OcrService> = match &env.ocr_endpoint {
        Some(endpoint) => Arc::new(HttpOcrService::new(ServiceCredentials::new(endpoint.clone()))),
        None => Arc::new(Disabled("OCR_ENDPOINT")),
    };
    let transcripts: Arc<dyn TranscriptService> = match &env.transcript_endpoint {
        Some(endpoint) => Arc::new(HttpTranscriptService::new(ServiceCredentials::new(
            endpoint.clone(),
        ))),
        None => Arc::new(Disabled("TRANSCRIPT_ENDPOINT")),
    };

    Ok(Services {
        fetcher: Arc::new(fetcher),
        ocr,
        transcripts,
        searcher: Arc::new(searcher),
        embedder: openai.clone(),
        classifier: Arc::new(HttpNliClassifier::new(nli)),
        model: openai,
        cache: Arc::new(MemoryCache::new()),
        sink: None,
    })
}

fn print_progress(event: &ProgressEvent) {
    let percent = format!("{:>3}%", event.progress_percent);
    let stage = format!("{:<10}", event.stage.as_str());
    eprintln!("{} {} {}", percent.bright_cyan(), stage.bold(), event.message.dimmed());
}

fn print_summary(result: &CheckResult) {
    eprintln!();
    match result.status {
        CheckStatus::Completed => eprintln!("{}", "Check completed".bright_green().bold()),
        CheckStatus::Cancelled => eprintln!("{}", "Check cancelled".yellow().bold()),
        CheckStatus::Failed => {
            let reason = result
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            eprintln!("{} {}", "Check failed:".bright_red().bold(), reason);
        }
    }

    for verified in &result.claims {
        let claim = &verified.claim;
        let verdict = match claim.verdict {
            Verdict::Supported => "SUPPORTED".bright_green(),
            Verdict::Contradicted => "CONTRADICTED".bright_red(),
            Verdict::Uncertain => "UNCERTAIN".yellow(),
            Verdict::Pending => "PENDING".dimmed(),
        };
        eprintln!(
            "  {} {} ({:.0}%)",
            verdict.bold(),
            claim.text,
            claim.confidence * 100.0
        );
        eprintln!("      {}", claim.rationale.dimmed());
        for (index, evidence) in verified.evidence.iter().enumerate() {
            eprintln!("      [{}] {}", index + 1, evidence.source_url.underline());
        }
    }
    eprintln!();
}
