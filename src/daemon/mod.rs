use anyhow::{Context, Result};
use log::{error, info};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use crate::flow::{Classifier, TriageFlow};
use crate::mailbox::InboxTools;

pub struct DaemonConfig {
    pub interval_secs: u64,
}

/// Run triage cycles until Ctrl-C.
pub fn run_poll_loop(
    inbox: &dyn InboxTools,
    classifier: &dyn Classifier,
    flow: &mut TriageFlow,
    cfg: DaemonConfig,
) -> Result<()> {
    let running = stop_on_ctrl_c()?;
    info!("polling every {}s; Ctrl-C to stop", cfg.interval_secs);
    let cycles = poll_while(
        &running,
        inbox,
        classifier,
        flow,
        Duration::from_secs(cfg.interval_secs),
    );
    info!("stopped after {cycles} cycle(s)");
    Ok(())
}

/// Flag that stays set until the process gets SIGINT.
fn stop_on_ctrl_c() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;
    Ok(running)
}

/// A failed cycle is logged and the loop carries on at the next tick.
/// Returns how many cycles ran.
fn poll_while(
    running: &AtomicBool,
    inbox: &dyn InboxTools,
    classifier: &dyn Classifier,
    flow: &mut TriageFlow,
    interval: Duration,
) -> usize {
    let mut cycles = 0;
    while running.load(Ordering::SeqCst) {
        cycles += 1;
        if let Err(e) = flow.run_cycle(inbox, classifier) {
            error!("triage cycle {cycles} failed: {e:#}");
        }
        sleep_while(running, interval);
    }
    cycles
}

/// Sleep up to `total`, waking early once `running` is cleared.
fn sleep_while(running: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(250);
    let mut slept = Duration::ZERO;
    while slept < total && running.load(Ordering::SeqCst) {
        let nap = step.min(total - slept);
        thread::sleep(nap);
        slept += nap;
    }
}
