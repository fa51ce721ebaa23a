mod cli;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("CFN_COMPOSE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = build(cli) {
        for error in e.chain() {
            println!("{error}")
        }
        std::process::exit(1);
    }
}

fn build(cli: cli::Cli) -> anyhow::Result<()> {
    let written = cfn_compose::build::build(
        &cli.config,
        &cli.path_output,
        cli.environment.as_deref(),
    )?;

    anyhow::ensure!(!written.is_empty(), "No stacks built");

    for path in written {
        println!("{}", path.display());
    }

    Ok(())
}
