mod attendance;
mod bot;
mod config;
mod conversation;
mod database;
mod dialog;
mod notify;
mod scheduler;
mod utils;

use anyhow::Result;
use attendance::AttendanceLedger;
use config::Config;
use conversation::ConversationStore;
use conversation::store::DEFAULT_SWEEP_INTERVAL_SECS;
use database::SqliteStore;
use dialog::{DialogOrchestrator, DialogSettings};
use poise::serenity_prelude as serenity;
use scheduler::engine::{SchedulerConfig, TaskScheduler};
use scheduler::reminders::{
    ArrivalFollowUpHandler, AttendanceStatsHandler, CheckInReminderHandler, EventReminderHandler,
    ReminderContext, ReminderPlanner, ReminderSettings,
};
use scheduler::task::TaskType;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::clock::{Clock, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kintai_bot=info,poise=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let pool = database::create_connection(&config.database_url).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let ledger = Arc::new(AttendanceLedger::new(store.clone(), clock.clone(), config.eta_policy));
    let conversations = Arc::new(ConversationStore::new(clock.clone()));

    let notifier = Arc::new(bot::notifier::DiscordNotifier::new(Arc::new(
        serenity::Http::new(&config.discord_token),
    )));
    let reminder_ctx = ReminderContext {
        ledger: ledger.clone(),
        users: store.clone(),
        notifier,
        tz: config.timezone,
    };
    let scheduler = TaskScheduler::builder(clock.clone(), SchedulerConfig::new(config.timezone))
        .handler(
            TaskType::CheckInReminder,
            Arc::new(CheckInReminderHandler(reminder_ctx.clone())),
        )
        .handler(
            TaskType::ArrivalFollowUp,
            Arc::new(ArrivalFollowUpHandler(reminder_ctx.clone())),
        )
        .handler(
            TaskType::AttendanceStats,
            Arc::new(AttendanceStatsHandler(reminder_ctx.clone())),
        )
        .handler(TaskType::EventReminder, Arc::new(EventReminderHandler(reminder_ctx)))
        .build();

    let planner = ReminderPlanner::new(
        scheduler.clone(),
        store.clone(),
        ReminderSettings {
            reminder_lead: config.reminder_lead,
            stats_time: config.stats_time,
            event_reminder_lead: config.event_reminder_lead,
        },
    );
    planner.bootstrap().await?;

    let shutdown = CancellationToken::new();
    let sweeper = conversations
        .clone()
        .spawn_sweeper(DEFAULT_SWEEP_INTERVAL_SECS, shutdown.clone());
    let cleanup = scheduler.spawn_cleanup();

    let dialog = Arc::new(DialogOrchestrator::new(
        conversations,
        ledger,
        store.clone(),
        planner.clone(),
        config.geofence(),
        clock,
        DialogSettings {
            tz: config.timezone,
            strict_geofence: config.geofence_strict,
        },
    ));

    let data = bot::Data {
        dialog,
        planner,
        users: store,
        config: config.clone(),
    };

    // Create and start the bot
    let mut client = bot::create_bot(config, data).await?;
    let shard_manager = client.shard_manager.clone();

    tracing::info!("Starting Discord bot...");

    tokio::select! {
        result = client.start() => {
            if let Err(why) = result {
                tracing::error!("Client error: {:?}", why);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    }

    shutdown.cancel();
    scheduler.shutdown();
    let _ = tokio::join!(sweeper, cleanup);

    tracing::info!("Stopped");
    Ok(())
}
