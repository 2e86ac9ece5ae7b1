use anyhow::Result;
use clap::Parser;
use rbi_cli::cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    let is_non_tui = !args.is_tui();

    // Silent mode installs no subscriber; only the final error is printed.
    if !is_silent {
        rbi_cli::logging::init_tracing(args.verbose, !is_non_tui)?;
    }

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
