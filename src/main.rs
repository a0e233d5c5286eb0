use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{
    Router,
    extract::{ConnectInfo, Request},
    routing::any,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use portico::{
    HttpClient, StateStore,
    adapters::{HealthChecker, HttpClientAdapter, HttpHandler, MemoryStore, RedisStore},
    config::{GatewayConfigValidator, StateBackend, models::GatewayConfig},
    core::upstream::HealthRegistry,
    metrics, tracing_setup,
    utils::GracefulShutdown,
};
use tower_http::compression::CompressionLayer;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "portico.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "portico.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "portico.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "portico.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    // Determine the command to run
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");
    let config: GatewayConfig = portico::config::load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    // Fail fast on a misconfigured gateway rather than failing per-request.
    GatewayConfigValidator::validate(&config)
        .map_err(|e| eyre!("Configuration invalid:\n{e}"))?;
    let config = Arc::new(config);

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);

    let store: Arc<dyn StateStore> = match config.state.backend {
        StateBackend::Redis => Arc::new(
            RedisStore::connect(&config.state.url)
                .await
                .map_err(|e| eyre!("Failed to connect shared state store: {e}"))?,
        ),
        StateBackend::Memory => {
            tracing::warn!(
                "Using in-memory state store; breaker and analytics state is not shared \
                across gateway instances"
            );
            Arc::new(MemoryStore::new())
        }
    };

    let health_registry = Arc::new(HealthRegistry::new(config.upstreams.keys()));

    let http_handler = Arc::new(
        HttpHandler::new(
            config.clone(),
            http_client.clone(),
            store,
            health_registry.clone(),
        )
        .context("Failed to build HTTP handler")?,
    );

    // Background upstream health prober, owned here so shutdown can abort it.
    let health_handle = if config.health_check.enabled {
        let checker = HealthChecker::new(
            health_registry,
            config.upstreams.clone(),
            config.health_check.clone(),
            http_client.clone(),
        );
        Some(tokio::spawn(async move {
            if let Err(e) = checker.run().await {
                tracing::error!("Health checker error: {}", e);
            }
        }))
    } else {
        tracing::info!("Upstream health checking is disabled in configuration");
        None
    };

    // Create graceful shutdown manager
    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    // Start signal handler for graceful shutdown
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let make_request_route = |handler: Arc<HttpHandler>| {
        any(
            move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>, req: Request| {
                let handler = handler.clone();
                async move { handler.handle_request(req, Some(client_addr)).await }
            },
        )
    };

    let app = Router::new()
        .route("/{*path}", make_request_route(http_handler.clone()))
        .route("/", make_request_route(http_handler.clone()))
        .layer(CompressionLayer::new());

    // Log configured routes, most specific first.
    for (prefix, upstream) in &config.routes {
        tracing::info!("Configured route: {} -> {}", prefix, upstream);
    }

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "Portico API Gateway listening on {} ({} routes, {} upstreams)",
        addr,
        config.routes.len(),
        config.upstreams.len()
    );

    let server_result = tokio::select! {
        result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>()
        ) => {
            result.context("Server error")
        },
        shutdown_reason = graceful_shutdown.wait_for_shutdown_signal() => {
            tracing::info!("Shutdown signal received: {:?}", shutdown_reason);

            if let Some(handle) = health_handle {
                tracing::info!("Shutting down health checker...");
                handle.abort();
            }

            tracing::info!("Graceful shutdown completed");
            Ok(())
        }
    };

    server_result?;

    // Shutdown tracing on exit
    tracing_setup::shutdown_tracing();

    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    use portico::config::load_config;

    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Routes: {}", config.routes.len());
            println!("   • Upstreams: {}", config.upstreams.len());
            println!("   • Protected Prefixes: {}", config.protected_routes.len());
            println!("   • Admin Prefixes: {}", config.admin_routes.len());
            println!("   • Health Checks: {}", config.health_check.enabled);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure upstream base URLs start with http:// or https://");
            println!("   • Check every route targets a configured upstream");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8000')");
            println!("   • Ensure rate limit periods use valid units (s, m, h)");
            println!("   • Supply the JWT secret (file or PORTICO__AUTH__JWT_SECRET)");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Portico API Gateway Configuration

# The address to listen on
listen_addr = "127.0.0.1:8000"

protected_routes = [
    "/api/v1/orders",
    "/api/v1/users/profile",
    "/api/v1/notifications",
    "/api/v1/preferences",
]

admin_routes = [
    "/api/v1/admin",
    "/api/v1/users/admin",
    "/api/v1/orders/admin",
]

[auth]
# Prefer supplying this via PORTICO__AUTH__JWT_SECRET
jwt_secret = "change-me-in-production"

[state]
backend = "redis"
url = "redis://127.0.0.1:6379"

[upstreams.user]
base_url = "http://localhost:8001"

[upstreams.product]
base_url = "http://localhost:8002"

[upstreams.order]
base_url = "http://localhost:8003"

[upstreams.notification]
base_url = "http://localhost:8004"

[routes]
"/api/v1/auth" = "user"
"/api/v1/users" = "user"
"/api/v1/products" = "product"
"/api/v1/categories" = "product"
"/api/v1/inventory" = "product"
"/api/v1/orders" = "order"
"/api/v1/notifications" = "notification"
"/api/v1/preferences" = "notification"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'portico serve --config {config_path}' to start the gateway");
    Ok(())
}
