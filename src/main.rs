use std::{process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use varcache::{
    application::{
        error::AppError,
        jobs::{
            ConsistencyCheckContext, WarmRecentImagesContext, process_consistency_check_job,
            process_warm_recent_images_job,
        },
        optimizer::FormatOptimizer,
        repos::{MediaRepo, OptionStore},
    },
    cache::{ConsistencyChecker, InvalidationOutcome, Invalidator, VariantCache, Warmer},
    config::{self, Command, NotifyCommand},
    domain::error::DomainError,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        optimizer::CommandOptimizer,
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

/// Everything a command needs, wired once from settings.
struct Services {
    cache: Arc<VariantCache>,
    invalidator: Arc<Invalidator>,
    checker: Arc<ConsistencyChecker>,
    warmer: Arc<Warmer>,
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args.command.unwrap_or(Command::Schedule);

    telemetry::init(&settings.logging)?;

    if matches!(command, Command::Migrate) {
        return run_migrate(&settings).await;
    }

    let services = build_services(&settings).await?;
    let outcome = services
        .invalidator
        .reconcile_settings(&settings.optimization)
        .await;
    if matches!(outcome, InvalidationOutcome::Full { .. }) {
        info!(
            target = "varcache::startup",
            "Optimization settings changed since the previous run; cache cleared"
        );
    }

    match command {
        Command::Schedule => run_schedule(&settings, services).await,
        Command::Check(args) => {
            print_json(&services.checker.check_consistency(args.repair).await)
        }
        Command::Rebuild => print_json(&services.cache.rebuild_from_filesystem().await),
        Command::Clear => {
            let chunks_removed = services.cache.clear_all().await?;
            print_json(&serde_json::json!({ "chunks_removed": chunks_removed }))
        }
        Command::Stats => {
            let stats = services.cache.get_stats().await;
            let hit_rate = stats.hit_rate();
            print_json(&serde_json::json!({
                "stats": stats,
                "hit_rate": hit_rate,
            }))
        }
        Command::Lookup(args) => {
            let variant = services
                .cache
                .get_variant(&args.url, args.format, args.width)
                .await;
            print_json(&serde_json::json!({
                "url": args.url,
                "format": args.format,
                "width": args.width,
                "variant_url": variant,
            }))
        }
        Command::Warm(args) => {
            let summary = if args.recent || args.ids.is_empty() {
                services.warmer.warm_recent_images().await
            } else {
                services.warmer.warm_images(&args.ids).await
            };
            print_json(&summary)
        }
        Command::Notify(args) => {
            let outcome = match args.event {
                NotifyCommand::ThemeSwitched => services.invalidator.theme_switched().await,
                NotifyCommand::PluginToggled {
                    plugin,
                    deactivated,
                } => {
                    services
                        .invalidator
                        .plugin_toggled(&plugin, !deactivated)
                        .await
                }
                NotifyCommand::ImageEdited { id } => services.invalidator.image_edited(id).await,
                NotifyCommand::ImageDeleted { id } => {
                    services.invalidator.image_deleted(id).await
                }
            };
            if let InvalidationOutcome::ImageNotFound { image_id } = outcome {
                return Err(DomainError::image_not_found(image_id).into());
            }
            print_json(&outcome)
        }
        Command::Migrate => Ok(()),
    }
}

async fn build_services(settings: &config::Settings) -> Result<Services, AppError> {
    let repositories = connect(settings.database.require_url()?, settings).await?;
    let store: Arc<dyn OptionStore> = Arc::new(repositories.clone());
    let media: Arc<dyn MediaRepo> = Arc::new(repositories);

    let cache_config = settings.cache_config();
    let mapper = settings.paths.mapper();
    let cache = Arc::new(VariantCache::new(&cache_config, store, mapper.clone()));

    let optimizer: Arc<dyn FormatOptimizer> = Arc::new(CommandOptimizer::new(
        settings.optimizer.cli_path.clone(),
        mapper,
        &settings.optimization,
    ));

    Ok(Services {
        invalidator: Arc::new(Invalidator::new(
            &cache_config,
            cache.clone(),
            media.clone(),
        )),
        checker: Arc::new(ConsistencyChecker::new(
            cache.clone(),
            cache_config.max_reported_issues,
        )),
        warmer: Arc::new(Warmer::new(
            settings.warmer_config(),
            cache.clone(),
            media,
            optimizer,
        )),
        cache,
    })
}

async fn connect(url: &str, settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    let repositories = PostgresRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    Ok(repositories)
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    let repositories = connect(settings.database.require_url()?, settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    info!(target = "varcache::migrate", "Migrations applied");
    Ok(())
}

async fn run_schedule(settings: &config::Settings, services: Services) -> Result<(), AppError> {
    let warm_worker = WorkerBuilder::new("warm-recent-images-worker")
        .data(WarmRecentImagesContext {
            warmer: services.warmer.clone(),
        })
        .backend(CronStream::new(settings.scheduler.warm.clone()))
        .build_fn(process_warm_recent_images_job);

    let consistency_worker = WorkerBuilder::new("consistency-check-worker")
        .data(ConsistencyCheckContext {
            checker: services.checker.clone(),
        })
        .backend(CronStream::new(settings.scheduler.consistency.clone()))
        .build_fn(process_consistency_check_job);

    info!(
        target = "varcache::schedule",
        "Starting scheduled warm and consistency workers"
    );

    Monitor::new()
        .register(warm_worker)
        .register(consistency_worker)
        .run_with_signal(tokio::signal::ctrl_c())
        .await
        .map_err(|err| AppError::unexpected(format!("job monitor stopped: {err}")))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
