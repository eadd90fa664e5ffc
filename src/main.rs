use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use premium_checkout::checkout::Checkout;
use premium_checkout::config::Config;
use premium_checkout::handlers::{self, AppState};
use premium_checkout::presenter::ConsolePresenter;

#[derive(Parser, Debug)]
#[command(name = "premium-checkout")]
#[command(about = "Subscription checkout that issues premium activation codes")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP checkout API (default)
    Serve,
    /// Issue and store a code for an already approved subscription
    Issue {
        /// Plan type, e.g. "mensual"
        #[arg(long)]
        plan: String,
        /// Subscription id from the payment provider
        #[arg(long, env = "SUBSCRIPTION_ID")]
        subscription_id: String,
    },
    /// List the configured plans
    Plans,
    /// List codes held in the offline ledger
    Offline,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "premium_checkout=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();

    let checkout = Checkout::from_config(&config).unwrap_or_else(|e| {
        eprintln!("Failed to start checkout: {}", e);
        std::process::exit(1);
    });

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, checkout).await,
        Command::Issue {
            plan,
            subscription_id,
        } => issue(checkout, &plan, &subscription_id).await,
        Command::Plans => print_plans(&checkout),
        Command::Offline => print_offline(&checkout),
    }
}

async fn serve(config: &Config, checkout: Checkout) {
    let state = AppState::new(checkout).with_trusted_proxy(config.trust_forwarded_for);
    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Premium checkout listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn issue(checkout: Checkout, plan_type: &str, subscription_id: &str) {
    let checkout = Arc::new(checkout);
    let mut session = checkout.session(Arc::new(ConsolePresenter));

    match session.approve(plan_type, subscription_id, None).await {
        Ok(outcome) => {
            tracing::info!(
                session_id = %outcome.session_id,
                persistence = ?outcome.persistence,
                "Code issued"
            );
        }
        // The presenter already printed the user-facing message
        Err(_) => std::process::exit(1),
    }
}

fn print_plans(checkout: &Checkout) {
    println!(
        "{:<10} {:<10} {:>8} {:>6}  {:<8} PROVIDER PLAN",
        "TYPE", "NAME", "PRICE", "DAYS", "PREFIX"
    );
    for (plan_type, plan) in checkout.catalog().iter() {
        println!(
            "{:<10} {:<10} {:>8} {:>6}  {:<8} {}",
            plan_type, plan.name, plan.price, plan.days, plan.code_prefix, plan.provider_plan_id
        );
    }
}

fn print_offline(checkout: &Checkout) {
    let entries = checkout.ledger().entries();
    if entries.is_empty() {
        println!("No offline codes.");
        return;
    }
    for entry in &entries {
        println!(
            "{}  {:<8} {}  subscription {}",
            entry.code, entry.record.plan_type, entry.record.timestamp, entry.record.subscription_id
        );
    }
    println!();
    println!("{} code(s) were never written to the realtime database.", entries.len());
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
