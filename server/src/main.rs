use config::Config;
use email::SendGridTransport;
use log_store::LogStore;
use notification::NotificationWorkflow;
use workflow::WeatherLogWorkflow;

mod config;
mod email;
mod error;
mod extractor;
mod log_store;
mod notification;
mod payload;
mod provision;
mod record;
mod retry;
mod scheduler;
mod storage;
mod weather_source;
mod workflow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    let log_schedule = scheduler::parse_schedule(&config.app.timer_schedule)?;
    let email_schedule = scheduler::parse_schedule(&config.app.email_timer_schedule)?;

    let store = LogStore::from_config(&config.storage)?;
    let weather_log = WeatherLogWorkflow::new(&config, store)?;
    let notification = NotificationWorkflow::new(&config, SendGridTransport::new(&config.email)?);

    log::info!(
        "Logging weather for {} into {:?} container {}",
        config.app.city_name,
        config.storage.provider,
        config.storage.container_name
    );

    let weather_log = &weather_log;
    let notification = &notification;

    let log_loop = scheduler::run(
        "weather logging",
        &log_schedule,
        config.app.run_on_startup,
        move || async move {
            let outcome = weather_log.run().await;
            if outcome.is_success() {
                log::info!("{}", outcome);
            } else {
                log::error!("{}", outcome);
            }
        },
    );

    let email_loop = scheduler::run(
        "email notification",
        &email_schedule,
        config.app.run_on_startup,
        move || async move {
            let outcome = notification.run().await;
            if outcome.is_success() {
                log::info!("{}", outcome);
            } else {
                log::error!("{}", outcome);
            }
        },
    );

    tokio::select! {
        _ = async { tokio::join!(log_loop, email_loop) } => {
            log::warn!("All schedules exhausted");
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
        }
    }

    Ok(())
}
