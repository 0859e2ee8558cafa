use clap::Parser;
use livepdf::Settings;
use livepdf::cli::commands::{self, convert::ConvertArgs};
use livepdf::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Init writes the file, it must not require a loadable one
    if let Commands::Init { force } = cli.command {
        if let Err(e) = commands::init::run_init(cli.config, force) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let config = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let config = config.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Falling back to defaults");
        Settings::default()
    });

    livepdf::logging::init_with_config(&config.logging, cli.verbose);

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &Settings) -> anyhow::Result<()> {
    match command {
        Commands::Init { .. } => Ok(()),
        Commands::Config => commands::init::run_config(config),
        Commands::Convert {
            paths,
            selections,
            output,
        } => {
            let args = ConvertArgs {
                paths,
                selections,
                output,
            };
            commands::convert::run_convert(args, config).await
        }
        Commands::Watch {
            paths,
            selections,
            output,
            no_auto_update,
        } => {
            let args = ConvertArgs {
                paths,
                selections,
                output,
            };
            commands::convert::run_watch(args, no_auto_update, config).await
        }
        Commands::Sheets { file } => commands::sheets::run(&file),
        Commands::History { clear } => commands::state::run_history(clear, config),
        Commands::Selection { action } => commands::state::run_selection(action, config),
        Commands::Session { action } => commands::state::run_session(action, config),
        Commands::Sweep { max_age_days } => commands::sweep::run(max_age_days, config),
    }
}
