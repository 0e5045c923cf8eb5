use std::process::ExitCode;

use clap::Parser;
use time::UtcOffset;
use tracing_subscriber::EnvFilter;
use welearn::cli::Cli;

fn init_tracing() {
    let filter = std::env::var("WELEARN_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    // Reading the local offset is only sound while the process is single threaded.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("cannot start async runtime: {err}");
            return ExitCode::from(2);
        }
    };
    match runtime.block_on(welearn::run(cli, offset)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(welearn::exit_code(&err))
        }
    }
}
