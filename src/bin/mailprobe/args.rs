use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use mailprobe::{ProbeOptions, ResolverOptions, ValidateOptions};

#[derive(Parser)]
#[command(
    name = "mailprobe",
    version,
    about = "Check e-mail addresses: syntax, MX records and an SMTP RCPT probe."
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// read addresses from stdin (one per line)
    #[arg(long)]
    pub stdin: bool,

    /// write the report to a file instead of stdout (any --format)
    #[arg(long, global = true)]
    pub out: Option<String>,

    /// format: human|json|ndjson|csv
    #[arg(long, global = true, default_value = "human")]
    pub format: String,

    /// probe the mailbox with EHLO / MAIL FROM / RCPT TO
    #[arg(long = "check-smtp", global = true)]
    pub check_smtp: bool,

    /// keep SMTP transcripts and log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    /// worker threads used with --stdin
    #[arg(long, default_value_t = 4)]
    pub jobs: usize,

    /// DNS query timeout (ms), single attempt
    #[arg(long = "dns-timeout", global = true, default_value_t = 5_000)]
    pub dns_timeout_ms: u64,

    /// use the resolver crate's public upstreams instead of the system config
    #[arg(long = "public-dns", global = true)]
    pub public_dns: bool,

    #[command(flatten)]
    pub probe: ProbeArgs,
}

#[derive(Args)]
pub struct ProbeArgs {
    /// name announced in EHLO/HELO
    #[arg(long, global = true, env = "MAILPROBE_HELO", default_value = "example.com")]
    pub helo: String,

    /// MAIL FROM envelope sender
    #[arg(
        long = "from",
        global = true,
        env = "MAILPROBE_FROM",
        default_value = "check@example.com"
    )]
    pub mail_from: String,

    /// SMTP port
    #[arg(long, global = true, default_value_t = 25)]
    pub port: u16,

    /// connect/read/write timeout (ms)
    #[arg(long = "timeout", global = true, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// number of MX hosts tried when the preferred one is unreachable
    #[arg(long = "max-mx", global = true, default_value_t = 1)]
    pub max_mx: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// run the pipeline on one address
    Validate { email: String },
    /// only resolve and print the MX records of a domain
    Mx { domain: String },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    pub fn validate_options(&self) -> ValidateOptions {
        ValidateOptions {
            check_mailbox: self.check_smtp,
            verbose_trace: self.debug,
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            timeout: Duration::from_millis(self.dns_timeout_ms),
        }
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            port: self.probe.port,
            timeout: Duration::from_millis(self.probe.timeout_ms),
            helo_domain: self.probe.helo.clone(),
            mail_from: self.probe.mail_from.clone(),
            max_hosts: self.probe.max_mx,
            verbose_trace: self.debug,
            ..ProbeOptions::default()
        }
    }
}
