use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use mlpg_gateway::{config::DEFAULT_BACKEND_URL, BackendClient, BackendHealth, GatewayConfig};
use mlpg_wizard::{
    preview::preview_upload,
    results::{report::write_exports, share::FileClipboard},
    share_results, Clipboard, FallbackTrainer, MockTrainingEngine, ModelCatalog,
    ModelCatalogEntry, Phase, PreprocessingOption, ResultsAnalysis, SeedPolicy, ShareOutcome,
    Step, TrainingBackend, TrainingRunResult, UploadedFile, WizardEvent, WizardSession,
    WizardTelemetry, WizardTimings,
};
use shared_event_bus::FileEventPublisher;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "mlpg", version, about = "ML playground wizard, headless")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lists the model catalog by phase.
    Catalog {
        /// Print the grouped JSON served by the gateway fallback.
        #[arg(long)]
        json: bool,
    },
    /// Parses a dataset and prints its preview.
    Preview {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Drives a wizard session from upload to results.
    Run(RunArgs),
    /// Checks that the training backend answers.
    Health {
        #[arg(long, default_value = DEFAULT_BACKEND_URL)]
        backend: String,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Dataset, `.csv` or `.json`.
    #[arg(long)]
    file: PathBuf,
    /// Column to predict; defaults to the last column.
    #[arg(long)]
    target: Option<String>,
    /// Column to leave out of the features; repeatable.
    #[arg(long = "exclude")]
    excluded: Vec<String>,
    /// Model ids, comma separated.
    #[arg(long, value_delimiter = ',')]
    models: Vec<String>,
    /// Select a whole phase (1-3 or basic/intermediate/advanced); repeatable.
    #[arg(long = "phase")]
    phases: Vec<Phase>,
    #[arg(long)]
    handle_missing: Option<String>,
    #[arg(long)]
    scaling: Option<String>,
    #[arg(long)]
    encoding: Option<String>,
    /// Training share in percent, 50 to 95.
    #[arg(long)]
    split: Option<u8>,
    /// Pins the mock seed's time component (epoch ms) and the progress animation.
    #[arg(long)]
    seed: Option<u64>,
    /// Training backend; the mock engine takes over when it is unreachable.
    #[arg(long)]
    backend: Option<String>,
    /// Writes the JSON export and text report here.
    #[arg(long)]
    export_dir: Option<PathBuf>,
    #[arg(long)]
    share_url: Option<String>,
    /// File standing in for the clipboard when sharing.
    #[arg(long)]
    clipboard_file: Option<PathBuf>,
    /// Print the simulated deployment of the best model.
    #[arg(long)]
    deploy: bool,
    /// Skip the pacing delays between steps.
    #[arg(long)]
    fast: bool,
    #[arg(long)]
    log_path: Option<PathBuf>,
    #[arg(long)]
    event_log: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Catalog { json } => {
            print_catalog(json)?;
            Ok(())
        }
        Commands::Preview { file, json } => handle_preview(&file, json),
        Commands::Run(args) => {
            let runtime = Runtime::new()?;
            runtime.block_on(async {
                let result = run_wizard(&args).await?;
                finish(&args, &result).await
            })
        }
        Commands::Health { backend } => handle_health(backend),
    }
}

fn print_catalog(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ModelCatalog::grouped_json())?);
        return Ok(());
    }
    for phase in Phase::ALL {
        println!("{} ({})", phase.title(), phase.subtitle());
        for model in ModelCatalog::models_in_phase(phase) {
            println!("{}", catalog_line(model));
        }
    }
    Ok(())
}

fn catalog_line(model: &ModelCatalogEntry) -> String {
    format!(
        "  {:<24} {:<28} {:<15} {}",
        model.id, model.name, model.supported_task, model.description
    )
}

fn load_upload(path: &Path) -> Result<UploadedFile> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    Ok(UploadedFile::new(name, bytes))
}

fn handle_preview(path: &Path, json: bool) -> Result<()> {
    let upload = load_upload(path)?;
    let preview = preview_upload(&upload).map_err(|err| {
        let message = err.user_message();
        anyhow::Error::new(err).context(message)
    })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }
    println!("{}: {}", upload.name(), preview.caption());
    println!("{}", preview.headers.join(" | "));
    for row in &preview.rows {
        let cells: Vec<String> = preview
            .headers
            .iter()
            .map(|header| match row.get(header) {
                Some(serde_json::Value::String(text)) => text.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    Ok(())
}

fn handle_health(backend: String) -> Result<()> {
    let config = GatewayConfig {
        backend_url: backend,
        ..GatewayConfig::default()
    };
    config.validate()?;
    let client = BackendClient::new(&config)?;
    let runtime = Runtime::new()?;
    match runtime.block_on(client.health()) {
        Ok(BackendHealth::Connected) => {
            println!("healthy: backend connected at {}", client.base_url());
            Ok(())
        }
        Ok(BackendHealth::Error(status)) => bail!("unhealthy: backend answered {status}"),
        Err(err) => bail!("unhealthy: backend disconnected ({err})"),
    }
}

fn telemetry_for(args: &RunArgs) -> Result<WizardTelemetry> {
    let mut builder = WizardTelemetry::builder("mlpg");
    if let Some(path) = &args.log_path {
        builder = builder.log_path(path.clone());
    }
    if let Some(path) = &args.event_log {
        builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
    }
    builder.build()
}

fn build_session(args: &RunArgs) -> Result<WizardSession> {
    let telemetry = telemetry_for(args)?;
    let mock = MockTrainingEngine::new(args.seed.map_or(SeedPolicy::WallClock, SeedPolicy::Fixed));
    let trainer: Arc<dyn TrainingBackend> = match &args.backend {
        Some(url) => {
            let config = GatewayConfig {
                backend_url: url.clone(),
                ..GatewayConfig::default()
            };
            config.validate()?;
            let client = BackendClient::new(&config)?;
            Arc::new(FallbackTrainer::new(Arc::new(client), mock).with_telemetry(telemetry.clone()))
        }
        None => Arc::new(mock),
    };
    let timings = if args.fast {
        WizardTimings {
            upload_advance: Duration::ZERO,
            preprocess_advance: Duration::ZERO,
            progress_tick: Duration::from_millis(5),
            ..WizardTimings::default()
        }
    } else {
        WizardTimings::default()
    };
    let mut builder = WizardSession::builder()
        .timings(timings)
        .trainer(trainer)
        .telemetry(telemetry);
    if let Some(seed) = args.seed {
        builder = builder.progress_seed(seed);
    }
    builder.build()
}

fn step(session: &WizardSession, event: WizardEvent) -> Result<()> {
    session.dispatch(event).map_err(|err| {
        let message = err.user_message();
        anyhow::Error::new(err).context(message)
    })
}

fn preprocessing_options(args: &RunArgs) -> Result<Vec<PreprocessingOption>> {
    [
        ("handleMissing", args.handle_missing.clone()),
        ("scaling", args.scaling.clone()),
        ("encoding", args.encoding.clone()),
        ("trainTestSplit", args.split.map(|split| split.to_string())),
    ]
    .into_iter()
    .filter_map(|(field, value)| {
        value.map(|value| PreprocessingOption::parse(field, &value).map_err(anyhow::Error::from))
    })
    .collect()
}

async fn run_wizard(args: &RunArgs) -> Result<TrainingRunResult> {
    let session = build_session(args)?;
    let upload = load_upload(&args.file)?;
    let name = upload.name().to_string();
    step(&session, WizardEvent::FileSelected(upload))?;

    let state = session
        .wait_for(|state| state.current_step == Step::Preprocess)
        .await;
    let preview = state
        .data_preview
        .context("upload produced no preview")?;
    println!("{name}: {}", preview.caption());

    let target = match &args.target {
        Some(target) => target.clone(),
        None => preview
            .headers
            .last()
            .cloned()
            .context("dataset has no columns")?,
    };
    step(&session, WizardEvent::TargetSelected(target.clone()))?;
    for column in &args.excluded {
        step(&session, WizardEvent::ExclusionToggled(column.clone()))?;
    }
    for option in preprocessing_options(args)? {
        step(&session, WizardEvent::OptionChanged(option))?;
    }
    step(&session, WizardEvent::PreprocessProceed)?;
    let features = session.state().preprocessing.feature_columns(&preview.headers).join(", ");
    println!("Target: {target}; features: {features}");

    for phase in &args.phases {
        step(&session, WizardEvent::PhaseToggled(*phase))?;
    }
    for id in &args.models {
        if !session.state().selected_models.contains(id) {
            step(&session, WizardEvent::ModelToggled(id.clone()))?;
        }
    }
    step(&session, WizardEvent::ModelsProceed)?;
    let selected = session.state().selected_models.len();
    println!(
        "Training {selected} model(s), estimated {} minute(s)",
        mlpg_wizard::training::progress::estimated_minutes(selected)
    );

    step(&session, WizardEvent::TrainingStarted)?;
    follow_training(&session).await;

    let state = session.state();
    if let Some(message) = state.last_error {
        bail!("training failed: {message}");
    }
    state.results.context("training finished without results")
}

async fn follow_training(session: &WizardSession) {
    let mut revisions = session.subscribe();
    let mut last_line = String::new();
    loop {
        let state = session.state();
        if let Some(progress) = &state.training_progress {
            let line = format!(
                "[{:>5.1}%] {} ({}/{})",
                progress.overall_percent,
                progress.current_model().unwrap_or("done"),
                progress.completed_count(),
                progress.models.len()
            );
            if line != last_line {
                println!("{line}");
                last_line = line;
            }
        }
        if !state.training_in_progress {
            return;
        }
        if revisions.changed().await.is_err() {
            return;
        }
    }
}

fn print_results(result: &TrainingRunResult) {
    let analysis = ResultsAnalysis::new(result);
    println!(
        "{:<5} {:<24} {:>9} {:>10} {:>8} {:>8}",
        "Rank", "Model", "Accuracy", "Precision", "Recall", "F1"
    );
    for (rank, model) in analysis.ranked().iter().enumerate() {
        println!(
            "{:<5} {:<24} {:>8.2}% {:>9.2}% {:>7.2}% {:>7.2}%",
            rank + 1,
            model.name,
            model.accuracy * 100.0,
            model.precision * 100.0,
            model.recall * 100.0,
            model.f1_score * 100.0
        );
    }
    if let Some(best) = analysis.best() {
        println!(
            "Best model: {} with {:.2}% accuracy",
            best.name,
            best.accuracy * 100.0
        );
    }
    for bucket in analysis.distribution() {
        println!("{}: {}", bucket.name, bucket.value);
    }
}

async fn finish(args: &RunArgs, result: &TrainingRunResult) -> Result<()> {
    print_results(result);
    if let Some(dir) = &args.export_dir {
        let files = write_exports(dir, result, &Local::now())?;
        println!("Exported {}", files.results.display());
        if let Some(report) = files.report {
            println!("Exported {}", report.display());
        }
    }
    if args.deploy {
        if let Some(deployment) = ResultsAnalysis::new(result).deploy_best() {
            println!("{}", serde_json::to_string_pretty(&deployment)?);
        }
    }
    if let Some(url) = &args.share_url {
        let clipboard = args.clipboard_file.as_ref().map(FileClipboard::new);
        let clipboard = clipboard.as_ref().map(|file| file as &dyn Clipboard);
        match share_results(result, url, None, clipboard).await {
            Ok(ShareOutcome::Shared) => println!("Results shared."),
            Ok(ShareOutcome::CopiedToClipboard(_)) => println!("Results link copied to clipboard!"),
            Err(err) => eprintln!("{}", err.user_message()),
        }
    }
    Ok(())
}
