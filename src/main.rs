use std::time::Duration;

use codeworker_logs::config::AppConfig;
use codeworker_logs::console::{format_status, Command, Console, Flow, HELP};
use codeworker_logs::health::{HealthClient, HealthState};
use codeworker_logs::shutdown::shutdown_signal;
use codeworker_logs::stream::{
    render_line, ControllerConfig, SseConnector, StreamController,
};
use codeworker_logs::utils::{init_logging, AppError, LogOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // 1. Environment
    dotenvy::dotenv().ok();

    // 2. Logging
    let _guard = init_logging(&LogOptions::from_env());

    // 3. Configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    // 4. Run
    if let Err(e) = run(config).await {
        error!(error = %e, code = e.error_code(), "Log viewer stopped with an error");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    let health = HealthClient::new(&config.api_base_url)?;
    let initial = health.check().await;
    info!(api_base_url = %config.api_base_url, health = %initial, "Backend health");
    let health_task = spawn_health_poller(health, initial, config.health_check_interval_secs);

    let controller = StreamController::new(
        SseConnector::new()?,
        ControllerConfig::default().with_max_log_lines(config.max_log_lines),
    );
    let mut logs = controller.subscribe_logs();
    let mut status_rx = controller.subscribe_status();

    if config.auto_connect {
        controller.connect(&config.stream_base_url, &config.stream_job_id);
    }

    let console = Console::new(&controller, &config);
    let mut stdout = std::io::stdout();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_status = None;

    eprintln!("{}", HELP);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = logs.recv() => match received {
                Ok(event) => println!("{}", render_line(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Terminal output fell behind, lines skipped");
                }
                Err(RecvError::Closed) => break,
            },
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                let key = (status.state, status.text.clone());
                if last_status.as_ref() != Some(&key) {
                    eprintln!("{}", format_status(&status));
                    last_status = Some(key);
                }
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(command) => match console.execute(command, &mut stdout) {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => {
                            warn!(error = %e, code = e.error_code(), "Failed to write command output");
                        }
                    },
                    Err(message) => eprintln!("{}", message),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin, commands disabled");
                    stdin_open = false;
                }
            },
        }
    }

    // Dropping the controller cancels retries and closes the stream
    drop(console);
    drop(controller);
    if let Some(task) = health_task {
        task.abort();
    }
    info!("Log viewer stopped");
    Ok(())
}

/// Re-checks backend health periodically and logs transitions
fn spawn_health_poller(
    health: HealthClient,
    initial: HealthState,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut last = initial;
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let state = health.check().await;
            if state != last {
                if state.is_up() {
                    info!(health = %state, "Backend health changed");
                } else {
                    warn!(health = %state, "Backend health changed");
                }
                last = state;
            }
        }
    }))
}
