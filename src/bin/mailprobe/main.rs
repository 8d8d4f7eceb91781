mod args;
mod output;

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use mailprobe::{DnsResolver, TcpConnector, ValidationResult, Validator, validate_batch};
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};

fn init_tracing(debug: bool) {
    let fallback = if debug { "mailprobe=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn build_resolver(cli: &Cli) -> Result<DnsResolver> {
    let options = cli.resolver_options();
    if cli.public_dns {
        Ok(DnsResolver::public(&options))
    } else {
        DnsResolver::from_system_conf(&options).context("load system DNS configuration")
    }
}

fn read_stdin() -> Result<Vec<String>> {
    let mut emails = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("read stdin")?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            emails.push(trimmed.to_string());
        }
    }
    Ok(emails)
}

// exit codes: 0 all valid, 2 some invalid, 1 fatal
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let resolver = build_resolver(&cli)?;

    if let Some(Commands::Mx { domain }) = &cli.cmd {
        let outcome = resolver.resolve(domain);
        output::write_mx(domain, &outcome, &cli)?;
        if outcome.is_err() {
            std::process::exit(2);
        }
        return Ok(());
    }

    let validator = Validator::new(resolver, TcpConnector, cli.probe_options());
    let options = cli.validate_options();

    let rows: Vec<ValidationResult> = match &cli.cmd {
        Some(Commands::Validate { email }) => vec![validator.validate(email, &options)],
        _ if cli.stdin => {
            let emails = read_stdin()?;
            tracing::debug!(count = emails.len(), jobs = cli.jobs, "validating batch");
            validate_batch(&validator, &emails, &options, cli.jobs)
        }
        _ => {
            Cli::clap_command().print_help()?;
            println!();
            return Ok(());
        }
    };

    output::write_reports(&rows, &cli)?;

    if output::any_invalid(&rows) {
        std::process::exit(2);
    }
    Ok(())
}
