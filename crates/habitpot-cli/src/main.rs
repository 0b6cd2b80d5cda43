use clap::{CommandFactory, Parser, Subcommand};
use habitpot_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "habitpot", version, about = "Habit tracker where every habit is a plant")]
struct Cli {
    /// User the command acts for
    #[arg(long, global = true, default_value = "local")]
    user: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Habit management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Pending wilt reminders
    Reminder {
        #[command(subcommand)]
        action: commands::reminder::ReminderAction,
    },
    /// Wilt sweeper
    Sweep {
        #[command(subcommand)]
        action: commands::sweep::SweepAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print shell completions
    Completions { shell: clap_complete::Shell },
}

/// Log to stderr so stdout stays machine-readable. `RUST_LOG` wins over the
/// configured filter.
fn init_tracing() {
    let configured = Config::load_or_default().logging.filter;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&configured))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Habit { action } => commands::habit::run(&cli.user, action),
        Commands::Reminder { action } => commands::reminder::run(&cli.user, action),
        Commands::Sweep { action } => commands::sweep::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "habitpot", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
