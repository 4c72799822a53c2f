use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use api_server::http;
use shared::chat::ChatOrchestrator;
use shared::config::{AppConfig, ChatSettings, load_dotenv};
use shared::llm::{GroqGateway, GroqGatewayConfig};
use shared::prayer_times::{AladhanPrayerTimes, PrayerTimesConfig};
use shared::repos::Store;
use shared::sessions::SessionStore;
use shared::sql_gate::SqlGate;
use shared::tools::{ToolRegistry, ToolServices};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "api_server=debug,shared=info,axum=info,tower_http=info";

#[tokio::main]
async fn main() {
    let dotenv = load_dotenv();
    init_tracing();
    or_exit(dotenv, "failed to load .env");

    let config = or_exit(AppConfig::from_env(), "failed to read config");
    let chat_settings = or_exit(ChatSettings::from_env(), "failed to read chat settings");
    let groq_config = or_exit(GroqGatewayConfig::from_env(), "failed to read Groq config");
    let prayer_config = or_exit(
        PrayerTimesConfig::from_env(),
        "failed to read prayer times config",
    );

    let store = or_exit(
        Store::connect(&config.database_url, config.database_max_connections).await,
        "failed to open database",
    );

    if config.run_migrations {
        let migrator = or_exit(
            sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await,
            "failed to load migrations",
        );
        or_exit(migrator.run(store.pool()).await, "failed to run migrations");
    }

    let gateway = or_exit(GroqGateway::new(groq_config), "failed to build Groq gateway");
    let prayer_times = Arc::new(or_exit(
        AladhanPrayerTimes::new(prayer_config, config.organization_time_zone.clone()),
        "failed to build prayer times client",
    ));

    let tools = or_exit(
        ToolRegistry::with_default_tools(
            ToolServices::new(store.clone(), prayer_times.clone(), config.storage_timeout()),
            SqlGate::new(&chat_settings.allowed_sql_operations),
        ),
        "failed to register tools",
    );
    let sessions = SessionStore::new(chat_settings.history_limit);
    let orchestrator = ChatOrchestrator::new(chat_settings, sessions, tools, Arc::new(gateway));

    info!(
        provider = config.ai_provider.as_str(),
        model = orchestrator.model_name(),
        tools = orchestrator.tools().len(),
        time_zone = %config.organization_time_zone,
        "assistant initialised"
    );

    let app = http::build_router(http::AppState {
        store,
        orchestrator,
        prayer_times,
        ai_provider: config.ai_provider,
        organization_time_zone: config.organization_time_zone.clone(),
        storage_timeout: config.storage_timeout(),
    })
    .layer(http::cors_layer(&config.cors_allowed_origins));

    let addr: SocketAddr = or_exit(config.bind_addr.parse(), "invalid API_BIND_ADDR");
    let listener = or_exit(
        tokio::net::TcpListener::bind(addr).await,
        "failed to bind listener",
    );

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server stopped with error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn or_exit<T, E: Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!("{context}: {err}");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
