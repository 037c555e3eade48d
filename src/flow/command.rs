use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Context, Result, anyhow, bail};
use log::debug;

use crate::domain::email::DraftRequest;
use crate::flow::{Classifier, TriageTask};

/// Classifier living in another process. The task goes to its stdin as JSON;
/// it answers on stdout with a JSON array of `{to, subject, body}` objects.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
}

impl CommandClassifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `argv[0]` is the program.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("classifier_command is empty"))?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }
}

fn parse_reply(stdout: &[u8]) -> Result<Vec<DraftRequest>> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text).context("classifier output is not a JSON array of drafts")
}

impl Classifier for CommandClassifier {
    fn triage(&self, task: &TriageTask) -> Result<Vec<DraftRequest>> {
        let input = serde_json::to_vec(task)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("starting classifier `{}`", self.program))?;

        // Feed stdin from its own thread while stdout is drained here; the
        // pipe closes when the writer finishes.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("classifier stdin was not captured"))?;
        let writer = thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .context("waiting for classifier")?;
        let written = writer
            .join()
            .map_err(|_| anyhow!("classifier stdin writer panicked"))?;

        if !output.status.success() {
            bail!(
                "classifier exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        match written {
            // It answered without reading everything; the answer stands.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("classifier closed stdin early");
            }
            other => other.context("writing emails to classifier")?,
        }

        let drafts = parse_reply(&output.stdout)?;
        debug!(
            "classifier proposed {} draft(s) for {} email(s)",
            drafts.len(),
            task.emails.len()
        );
        Ok(drafts)
    }
}
