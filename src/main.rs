use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;

use dne_loader::config::LoaderConfig;
use dne_loader::error::{IngestionError, IngestionResult};
use dne_loader::ingestion::{IngestionOptions, RunSummary, ensure_schema, run_ingestion};
use dne_loader::layout::LayoutRegistry;
use dne_loader::store::{MemoryStore, PgStore, Store};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn")).init();

    let config = match LoaderConfig::try_parse() {
        Ok(config) => config,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&config).await {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &LoaderConfig) -> IngestionResult<RunSummary> {
    if !config.input_dir.is_dir() {
        return Err(IngestionError::InputDirMissing(config.input_dir.clone()));
    }

    let registry = config.load_registry()?;
    let options = config.ingestion_options();
    log::debug!("{options:?}");

    let summary = if config.dry_run {
        log::info!("dry run: loading into an in-memory store");
        let mut store = MemoryStore::new();
        load(&mut store, &registry, config, &options).await?
    } else {
        let db = &config.database;
        if !config.skip_create_database {
            PgStore::ensure_database(db.connect_options(), &db.name).await?;
        }
        let mut store = PgStore::connect(db.connect_options()).await?;
        log::info!("connected to {}:{}/{}", db.host, db.port, db.name);

        let result = load(&mut store, &registry, config, &options).await;
        store.close().await;
        result?
    };

    if let Some(path) = &config.report_json {
        summary.write_json(path)?;
        log::info!("wrote report to {}", path.display());
    }

    Ok(summary)
}

async fn load<S: Store>(
    store: &mut S,
    registry: &LayoutRegistry,
    config: &LoaderConfig,
    options: &IngestionOptions,
) -> IngestionResult<RunSummary> {
    ensure_schema(store, registry).await?;
    run_ingestion(store, registry, &config.input_dir, options).await
}
