use crate::demo::{run_demo, run_drift_report, run_score, DemoArgs, DriftReportArgs, ScoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use risk_engine::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Credit Risk Scoring Service",
    about = "Score loan applicants, explain decisions, and monitor feature drift",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score one applicant record from a JSON file using the configured artifacts
    Score(ScoreArgs),
    /// Run a drift check over a CSV batch using the configured artifacts
    DriftCheck(DriftReportArgs),
    /// Run an end-to-end demo with a built-in model and reference distribution
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Score(args) => run_score(args),
        Command::DriftCheck(args) => run_drift_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
