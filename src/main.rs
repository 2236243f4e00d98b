use anyhow::{Context, Result};
use clap::Parser;

use veripy::config::CliArgs;
use veripy::sandbox::create_executor;
use veripy::verifier::Verifier;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let code = std::fs::read_to_string(&cli.code_path).with_context(|| {
        format!("Failed to read candidate code {}", cli.code_path.display())
    })?;
    let suite = cli.load_suite()?;

    let executor = create_executor(cli.isolation(), cli.image.clone())?;
    let verifier = Verifier::new(executor, cli.timeout, cli.limits());

    let result = verifier.verify(&code, &cli.function_name, &suite).await?;
    println!("{result}");

    std::process::exit(if result.passed_all { 0 } else { 1 });
}
