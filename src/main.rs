use speech_master::{
    build_router,
    config::AppConfig,
    llm::{AnalysisAssistant, OpenAiClient},
    pipeline::{AnalysisPipeline, CommandPipeline},
    AppState,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.upload_dir) {
        tracing::warn!("Failed to create upload directory {}: {}", config.upload_dir.display(), e);
    } else {
        tracing::info!("Upload directory ready: {}", config.upload_dir.display());
    }

    let command = CommandPipeline::from_config(&config.pipeline);
    tracing::info!(
        "🎬 Analysis pipeline: {} {} (timeout {:?})",
        command.program(),
        config.pipeline.args.join(" "),
        config.pipeline.timeout
    );
    let pipeline: Arc<dyn AnalysisPipeline> = Arc::new(command);

    let assistant: Option<Arc<dyn AnalysisAssistant>> = match &config.openai {
        Some(openai) => {
            tracing::info!("Initializing OpenAI client ({})...", openai.model);
            Some(Arc::new(OpenAiClient::from_config(openai)))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not found. Chat about recordings will be disabled.");
            None
        }
    };

    let bind_addr = config.bind_addr.clone();
    let sweep_interval = config.session_sweep_interval;
    let shared_state = Arc::new(AppState::new(config, pipeline, assistant));

    let app = build_router(shared_state.clone());

    // Expire idle sessions and delete their uploads
    let sweeper_state = shared_state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = sweeper_state.sweep_idle_sessions().await;
            if expired > 0 {
                tracing::info!("🧹 Swept {} idle session(s)", expired);
            } else {
                tracing::debug!("Session sweep found nothing to expire");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {}: {}", bind_addr, e));
    tracing::info!("listening on {}", bind_addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,speech_master=trace,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,speech_master=info,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for log aggregation
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("💬 SpeechMaster starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
