use anyhow::Result;
use astrid_core::{RecordingWakeScheduler, WakeScheduler};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod daemon;
mod reminders_cmd;
mod sink;
mod state;

use app::{App, Paths};
use reminders_cmd::{AlarmCommand, TaskCommand};

#[derive(Parser, Debug)]
#[command(
    name = "astrid",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ASTRID_BUILD_SHA"), ")"),
    about = "Task reminders: scheduling, quiet hours and notifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Manage absolute alarms on tasks
    Alarm {
        #[command(subcommand)]
        command: AlarmCommand,
    },

    /// Recompute reminders for every task
    ScheduleAll,

    /// Show pending reminders and the next wake-up
    Queue,

    /// Deliver everything due now (what a wake-up would do)
    Dispatch,

    /// Keep running and deliver reminders as they come due (Ctrl-C to stop)
    Run,

    /// Configuration file (~/.astrid/config.toml)
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("astrid=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config(),
            ConfigCommand::Show => config::show_config(),
        },

        Command::Run => {
            let cfg = config::load_config()?;
            let (wake, rx) = daemon::TimerWake::new();
            let app = App::build(&cfg, Paths::from_home()?, Arc::new(wake))?;
            daemon::run(app, rx).await
        }

        Command::Task { command } => {
            let (app, tz) = one_shot()?;
            app.restore_queue()?;
            reminders_cmd::run_task(&app, tz, command)?;
            app.save_queue()
        }

        Command::Alarm { command } => {
            let (app, tz) = one_shot()?;
            app.restore_queue()?;
            reminders_cmd::run_alarm(&app, tz, command)?;
            app.save_queue()
        }

        Command::ScheduleAll => {
            let (app, tz) = one_shot()?;
            let n = app.scheduler.schedule_all_alarms();
            println!("Scheduled reminders for {n} tasks");
            reminders_cmd::print_queue(&app, tz);
            app.save_queue()
        }

        Command::Queue => {
            let (app, tz) = one_shot()?;
            app.restore_queue()?;
            reminders_cmd::print_queue(&app, tz);
            app.save_queue()
        }

        Command::Dispatch => {
            let (app, tz) = one_shot()?;
            app.restore_queue()?;
            let report = app.dispatcher.run();
            if report.deferred {
                println!("Quiet hours: nothing delivered");
            }
            println!(
                "Dispatch complete. Shown {}, suppressed {}, failed {}.",
                report.shown, report.suppressed, report.failed
            );
            reminders_cmd::print_queue(&app, tz);
            app.save_queue()
        }
    }
}

/// Engine for commands that exit right away. Nothing stays alive to be
/// woken, so the requested wake-up is only recorded for display.
fn one_shot() -> Result<(App, Tz)> {
    let cfg = config::load_config()?;
    let tz = cfg.timezone()?;
    let wake: Arc<dyn WakeScheduler> = Arc::new(RecordingWakeScheduler::new());
    Ok((App::build(&cfg, Paths::from_home()?, wake)?, tz))
}
