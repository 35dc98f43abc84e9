use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use template_sync::db::{SqlJobStore, SqlTemplateStore, SqlUserRegistry, init_db};
use template_sync::error::SyncError;
use template_sync::event::Provider;
use template_sync::git::GitCliClient;
use template_sync::logging::setup_logging;
use template_sync::pipeline::HookContext;
use template_sync::sync::ProviderClient;
use template_sync::trigger::ScriptWorkflowTrigger;
use template_sync::{AppState, api, load_config};
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "sync_config.toml";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    if let Err(e) = run().await {
        eprintln!("Startup error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), SyncError> {
    let config_path =
        std::env::var("SYNC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = load_config(&config_path)?;
    config.apply_env_overrides();
    config.validate()?;

    // Held until shutdown so buffered file logs are flushed
    let _log_guard = setup_logging(&config.logging)?;
    info!("Using config at {:?}", config_path);
    if config.webhook.secret.is_empty() {
        warn!("No webhook secret configured; deliveries are not authenticated");
    }

    let pool = init_db(&config.server.database).await?;
    let templates = SqlTemplateStore::new(pool.clone());
    let job_store = SqlJobStore::new(pool.clone());
    let users = SqlUserRegistry::new(pool);

    let mut clients: HashMap<Provider, Arc<dyn ProviderClient>> = HashMap::new();
    for provider in Provider::ALL {
        let token = config.access_token(provider).map(String::from);
        clients.insert(
            provider,
            Arc::new(GitCliClient::new(token, config.sync.work_dir.clone())),
        );
    }

    let trigger = ScriptWorkflowTrigger::new(config.workflow.clone(), job_store.clone());
    let hooks = HookContext {
        secret: config.webhook.secret.clone(),
        deploy_type: config.sync.deploy_type.clone(),
        timeout: config.sync.provider_timeout(),
        max_concurrency: config.sync.max_concurrency,
        templates: Arc::new(templates.clone()),
        users: Arc::new(users),
        clients,
        trigger: Arc::new(trigger),
    };

    let bind_address = config.server.bind_address.clone();
    let state = Arc::new(AppState {
        config,
        hooks,
        templates,
        job_store,
        start_time: Instant::now(),
        started_at: Utc::now(),
    });

    let app = api::router(state);

    info!("Listening on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
