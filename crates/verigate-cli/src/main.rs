//! Verigate CLI binary entrypoint.

use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use verigate_cli::cli::{Cli, Commands, LogFormat};
use verigate_cli::commands::{
    AuthorizeCommand, DispatchCommand, RotateCommand, SeedCommand, ShowCommand,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = io::stdout().lock();
    match runtime.block_on(run(cli, &mut stdout, io::stdin().lock())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run<W: Write, R: Read>(
    cli: Cli,
    out: &mut W,
    input: R,
) -> Result<(), verigate_cli::CliError> {
    let state_dir = cli.state_dir.as_path();

    match &cli.command {
        Commands::Rotate(args) => {
            let cmd = RotateCommand::new(state_dir);
            cmd.execute(out, args).await?;
        }
        Commands::Dispatch(args) => {
            let cmd = DispatchCommand::new(state_dir);
            cmd.execute(input, out, args).await?;
        }
        Commands::Authorize(args) => {
            let cmd = AuthorizeCommand::new(state_dir);
            cmd.execute(out, args).await?;
        }
        Commands::Seed(args) => {
            let cmd = SeedCommand::new(state_dir);
            cmd.execute(out, args).await?;
        }
        Commands::Show(args) => {
            let cmd = ShowCommand::new(state_dir);
            cmd.execute(out, args).await?;
        }
    }

    Ok(())
}
