use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};

use inbox_triage::auth::secret_store;
use inbox_triage::config::load_config;
use inbox_triage::daemon::{DaemonConfig, run_poll_loop};
use inbox_triage::flow::TriageFlow;
use inbox_triage::flow::command::CommandClassifier;
use inbox_triage::mailbox::{InboxTools, Mailbox};

#[derive(Parser)]
#[command(name = "inbox_triage")]
#[command(about = "Fetch recent mail, classify it, draft replies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print summaries of recent messages
    Fetch {
        #[arg(long)]
        max_results: Option<u32>,

        /// Look back this many hours
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Create a draft
    Draft {
        #[arg(long)]
        to: String,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        body: String,
    },

    /// Run one fetch/classify/draft cycle
    Run,

    /// Run cycles until interrupted
    Poll {
        /// Seconds between cycles (defaults to poll_interval_secs from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Store the OAuth client secret in keyring
    SetClientSecret {
        #[arg(long)]
        client_id: String,
    },

    /// Forget the cached credential
    Logout,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;

    match cli.cmd {
        Command::SetClientSecret { client_id } => {
            eprintln!("Paste client secret (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
            let secret = secret.trim();
            secret_store::save_client_secret(&client_id, secret)?;
            println!("Saved client secret for client_id {}", client_id);
            Ok(())
        }

        Command::Logout => {
            let mailbox = Mailbox::from_config(&cfg)?;
            mailbox.store().invalidate()?;
            println!("Removed cached credential");
            Ok(())
        }

        Command::Fetch { max_results, hours } => {
            let mailbox = Mailbox::from_config(&cfg)?;
            let hours = hours.unwrap_or(cfg.time_window_hours);
            let emails =
                mailbox.fetch_recent_emails(max_results.unwrap_or(cfg.max_results), hours)?;
            if emails.is_empty() {
                println!("No emails found in the last {hours} hours");
            }
            for e in emails {
                println!("From: {}\nSubject: {}\n---", e.sender, e.subject);
            }
            Ok(())
        }

        Command::Draft { to, subject, body } => {
            let mailbox = Mailbox::from_config(&cfg)?;
            let result = mailbox.create_draft(&to, &subject, &body)?;
            match (result.draft_id(), result.error_detail()) {
                (Some(id), _) => println!("Draft created successfully. Draft ID: {id}"),
                (None, detail) => {
                    return Err(anyhow!(
                        "draft creation failed: {}",
                        detail.unwrap_or_default()
                    ));
                }
            }
            Ok(())
        }

        Command::Run => {
            let mailbox = Mailbox::from_config(&cfg)?;
            let classifier = classifier(&cfg)?;
            let mut flow = TriageFlow::new(&cfg.topic, cfg.max_results, cfg.time_window_hours);
            let report = flow.run_cycle(&mailbox, &classifier)?;
            println!(
                "{} fetched, {} new, {} drafted, {} failed",
                report.fetched, report.new, report.drafted, report.failed
            );
            Ok(())
        }

        Command::Poll { interval } => {
            let mailbox = Mailbox::from_config(&cfg)?;
            let classifier = classifier(&cfg)?;
            let mut flow = TriageFlow::new(&cfg.topic, cfg.max_results, cfg.time_window_hours);
            run_poll_loop(
                &mailbox,
                &classifier,
                &mut flow,
                DaemonConfig {
                    interval_secs: interval.unwrap_or(cfg.poll_interval_secs),
                },
            )
        }
    }
}

fn classifier(cfg: &inbox_triage::config::Config) -> Result<CommandClassifier> {
    let argv = cfg
        .classifier_command
        .as_deref()
        .ok_or_else(|| anyhow!("classifier_command not set in config"))?;
    CommandClassifier::from_argv(argv)
}
