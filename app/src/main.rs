//! Account balance console.
//!
//! Event-sourced balance with a checkpointed projection.

use account_balance::view::ConsoleView;
use account_balance::{App, Config, Flow};
use anyhow::Context;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout is the screen.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "account_balance=info,balance_projections=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    info!(
        stream = %config.stream,
        checkpoint = %config.checkpoint_file.display(),
        event_log = %config.event_log_path.display(),
        "Configuration loaded"
    );

    let view = Arc::new(ConsoleView::stdout());
    let mut app = App::start_local(&config, view.clone())
        .await
        .context("failed to start")?;
    view.redraw();

    let flow = match app.run(BufReader::new(tokio::io::stdin())).await {
        Ok(flow) => flow,
        Err(e) => {
            app.shutdown(Flow::Exit).await.ok();
            return Err(e).context("account balance service stopped");
        }
    };

    app.shutdown(flow).await?;
    info!("Goodbye");
    Ok(())
}
