use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scenewatch_core::app::{
    BatchOrchestrator, PipelineBuilder, Resolution, TokenManager, render_text,
};
use scenewatch_core::config::Settings;
use scenewatch_core::domain::Aoi;
use scenewatch_core::impls::{
    FsArtifactStore, HttpCatalogClient, HttpRenderClient, JsonFileAoiSource, OAuthTokenSource,
};
use scenewatch_core::ports::{AoiSource, ArtifactStore, Clock, SystemClock};

#[derive(Debug, Parser)]
#[command(name = "scenewatch", version, about = "Latest Sentinel-2 composites for a set of AOIs")]
struct Cli {
    /// TOML settings file; environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve, render and store the latest scene for every AOI.
    Run(RunArgs),

    /// Resolve the latest scene per AOI without rendering anything.
    Scenes(SearchArgs),

    /// List the configured AOIs.
    Aois(OutputArgs),

    /// Show what the artifact store currently holds.
    Status(OutputArgs),
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Lookback window in days.
    #[arg(long)]
    days: Option<u32>,

    /// Maximum cloud cover in percent.
    #[arg(long)]
    cloud: Option<f64>,

    /// Only process these AOI ids (repeatable).
    #[arg(long = "aoi")]
    aois: Vec<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    search: SearchArgs,

    /// Maximum AOIs processed at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Give up on unfinished AOIs after this many seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
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

impl SearchArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(days) = self.days {
            settings.search.lookback_days = days;
        }
        if let Some(cloud) = self.cloud {
            settings.search.cloud_ceiling = Some(cloud);
        }
    }
}

fn select_aois(all: Vec<Aoi>, wanted: &[String]) -> Result<Vec<Aoi>> {
    if wanted.is_empty() {
        return Ok(all);
    }
    let unknown: Vec<_> = wanted
        .iter()
        .filter(|w| !all.iter().any(|a| a.id.as_str() == w.as_str()))
        .collect();
    if !unknown.is_empty() {
        bail!("unknown AOI id(s): {unknown:?}");
    }
    Ok(all
        .into_iter()
        .filter(|a| wanted.iter().any(|w| w == a.id.as_str()))
        .collect())
}

fn build_pipeline(settings: &Settings, clock: Arc<dyn Clock>) -> Result<BatchOrchestrator> {
    let tokens = OAuthTokenSource::new(
        settings.auth.token_url.clone(),
        settings.auth.client_id.clone(),
        settings.auth.client_secret.clone(),
        Duration::from_secs(settings.auth.timeout_secs),
        clock.clone(),
    )
    .context("building token client")?;
    let session = Arc::new(TokenManager::with_margin(
        Arc::new(tokens),
        clock.clone(),
        chrono::Duration::seconds(settings.auth.margin_secs as i64),
    ));

    let catalog = HttpCatalogClient::new(
        &settings.api.base_url,
        settings.api.collection.clone(),
        settings.api.page_limit,
        settings.api.max_pages,
        Duration::from_secs(settings.api.catalog_timeout_secs),
        session.clone(),
    )
    .context("building catalog client")?;
    let render_timeout = Duration::from_secs(settings.api.render_timeout_secs);
    // the HTTP timeout sits just above the per-attempt timeout
    let render = HttpRenderClient::new(
        &settings.api.base_url,
        settings.api.collection.clone(),
        render_timeout + Duration::from_secs(5),
        session.clone(),
    )
    .context("building render client")?;

    let orchestrator = PipelineBuilder::new()
        .catalog(Arc::new(catalog))
        .render(Arc::new(render))
        .store(Arc::new(FsArtifactStore::new(&settings.paths.output_dir)))
        .session(session)
        .clock(clock)
        .retry(settings.retry_policy())
        .render_timeout(render_timeout)
        .build()?;
    Ok(orchestrator)
}

async fn load_aois(settings: &Settings, wanted: &[String]) -> Result<Vec<Aoi>> {
    let aois = JsonFileAoiSource::new(&settings.paths.aoi_file)
        .load()
        .await
        .context("loading AOIs")?;
    select_aois(aois, wanted)
}

async fn run(mut settings: Settings, args: RunArgs) -> Result<()> {
    args.search.apply(&mut settings);
    if let Some(concurrency) = args.concurrency {
        settings.batch.concurrency = concurrency;
    }
    if let Some(deadline) = args.deadline_secs {
        settings.batch.deadline_secs = Some(deadline);
    }
    settings.validate(true)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let aois = load_aois(&settings, &args.search.aois).await?;
    if aois.is_empty() {
        tracing::warn!(path = %settings.paths.aoi_file.display(), "no AOIs configured");
    }
    let orchestrator = build_pipeline(&settings, clock.clone())?;
    let params = settings.batch_params(clock.now());

    let report = tokio::select! {
        report = orchestrator.run_batch(&aois, &params) => report.context("batch could not start")?,
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    };

    if args.search.output.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let base = settings.paths.output_dir.display().to_string();
        print!("{}", render_text(&report, Some(&base)));
    }
    Ok(())
}

async fn scenes(mut settings: Settings, args: SearchArgs) -> Result<()> {
    args.apply(&mut settings);
    settings.validate(true)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let aois = load_aois(&settings, &args.aois).await?;
    let orchestrator = build_pipeline(&settings, clock.clone())?;
    let window = settings.window(clock.now());
    let cloud = settings.cloud_filter();

    let mut rows = Vec::with_capacity(aois.len());
    for aoi in &aois {
        let row = match orchestrator.resolver().resolve(aoi, &window, &cloud).await {
            Ok(Resolution::Found(scene)) => {
                let cloud = scene
                    .cloud_cover
                    .map_or_else(|| "unknown".to_string(), |c| format!("{c:.1}%"));
                println_text(
                    !args.output.json,
                    format_args!("{:<20} {}  {}  cloud {cloud}", aoi.id, scene.acquired_at.to_rfc3339(), scene.id),
                );
                serde_json::json!({ "aoi_id": aoi.id, "name": aoi.name, "scene": scene })
            }
            Ok(Resolution::NoSceneFound { candidates_seen }) => {
                println_text(
                    !args.output.json,
                    format_args!("{:<20} no scene ({candidates_seen} candidates)", aoi.id),
                );
                serde_json::json!({
                    "aoi_id": aoi.id,
                    "name": aoi.name,
                    "scene": null,
                    "candidates_seen": candidates_seen,
                })
            }
            Err(err) => {
                println_text(!args.output.json, format_args!("{:<20} error: {err}", aoi.id));
                serde_json::json!({
                    "aoi_id": aoi.id,
                    "name": aoi.name,
                    "kind": err.kind(),
                    "error": err.to_string(),
                })
            }
        };
        rows.push(row);
    }
    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Ok(())
}

fn println_text(enabled: bool, line: std::fmt::Arguments<'_>) {
    if enabled {
        println!("{line}");
    }
}

async fn aois(settings: Settings, args: OutputArgs) -> Result<()> {
    settings.validate(false)?;
    let aois = load_aois(&settings, &[]).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&aois)?);
    } else {
        for aoi in &aois {
            let [w, s, e, n] = aoi.bbox.to_array();
            println!("{:<20} {:<30} [{w}, {s}, {e}, {n}]", aoi.id, aoi.name);
        }
    }
    Ok(())
}

async fn status(settings: Settings, args: OutputArgs) -> Result<()> {
    settings.validate(false)?;
    let store = FsArtifactStore::new(&settings.paths.output_dir);
    let stored = store.list().await.context("reading artifact store")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else if stored.is_empty() {
        println!("no artifacts in {}", settings.paths.output_dir.display());
    } else {
        for meta in &stored {
            println!(
                "{:<20} {}  {}  {}",
                meta.aoi_id,
                meta.acquired_at.to_rfc3339(),
                meta.scene_id,
                meta.location.as_deref().unwrap_or("-"),
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    match cli.command {
        Command::Run(args) => run(settings, args).await,
        Command::Scenes(args) => scenes(settings, args).await,
        Command::Aois(args) => aois(settings, args).await,
        Command::Status(args) => status(settings, args).await,
    }
}
