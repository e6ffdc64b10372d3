use std::{process, sync::Arc};

use aggregator::{
    application::{
        error::AppError,
        groups::GroupService,
        tasks::TaskSupervisor,
        views::{ViewAggregator, ViewsConfig},
    },
    cache::{CacheConfig, KeyValueStore, MemoryStore, ReadThroughCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        redis::RedisStore,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
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

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ReconcileViews(_) => run_reconcile_views(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let store = init_cache_store(&settings.cache).await?;

    let views = ViewAggregator::new(
        store.clone(),
        repositories.clone(),
        ViewsConfig::from(&settings.views),
    );
    let cache = ReadThroughCache::new(store, CacheConfig::from(&settings.cache));
    let groups = GroupService::new(repositories, cache, views.clone());

    let mut supervisor = TaskSupervisor::new();
    supervisor.spawn("view-reconciler", move |shutdown| views.run(shutdown));

    let result = serve_http(&settings, ApiState { groups }).await;

    supervisor
        .shutdown(settings.server.graceful_shutdown)
        .await;

    result
}

async fn run_reconcile_views(settings: config::Settings) -> Result<(), AppError> {
    if settings.cache.redis_url.is_none() {
        return Err(AppError::from(InfraError::configuration(
            "reconcile-views needs cache.redis_url; in-memory counters live only inside a serving process",
        )));
    }

    let repositories = init_repositories(&settings).await?;
    let store = init_cache_store(&settings.cache).await?;
    let views = ViewAggregator::new(store, repositories, ViewsConfig::from(&settings.views));

    let outcome = views
        .reconcile()
        .await
        .map_err(|err| AppError::unexpected(format!("view reconciliation failed: {err}")))?;

    info!(
        target = "aggregator::reconcile",
        groups = outcome.groups,
        views = outcome.views,
        "Reconciliation completed"
    );
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, &settings.database)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    if settings.database.run_migrations {
        PostgresRepositories::run_migrations(&pool)
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        info!("database migrations applied");
    }

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn init_cache_store(
    settings: &config::CacheSettings,
) -> Result<Arc<dyn KeyValueStore>, AppError> {
    match settings.redis_url.as_deref() {
        Some(url) => Ok(Arc::new(RedisStore::connect(url).await?)),
        None => {
            warn!("cache.redis_url is not set; using a process-local cache");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(addr = %settings.server.addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
