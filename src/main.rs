use clap::Parser;
use lifeplan::api::{Cli, Command, run_http_server, run_simulate_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => {
            let json = run_simulate_command(&args)?;
            println!("{json}");
        }
        Command::Serve { port } => run_http_server(port).await?,
    }
    Ok(())
}
