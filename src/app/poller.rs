use crate::domain::{FileChange, PollTarget, SessionId};
use crate::infra::{GitCli, ProcessRunner};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepReport {
    pub id: SessionId,
    pub changes: Vec<FileChange>,
}

/// Background change detection for every session. One task for the whole
/// process; each tick performs a full sequential sweep before the next tick
/// can start.
pub async fn run_change_poller<R: ProcessRunner>(
    git: GitCli<R>,
    interval: Duration,
    targets: watch::Receiver<Vec<PollTarget>>,
    results: mpsc::UnboundedSender<Vec<SweepReport>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let snapshot = targets.borrow().clone();
                if snapshot.is_empty() {
                    continue;
                }
                let reports = tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    reports = sweep(&git, &snapshot) => reports,
                };
                debug!(sessions = reports.len(), "change sweep finished");
                if results.send(reports).is_err() {
                    break;
                }
            }
        }
    }
    debug!("change poller stopped");
}

async fn sweep<R: ProcessRunner>(git: &GitCli<R>, targets: &[PollTarget]) -> Vec<SweepReport> {
    let mut reports = Vec::with_capacity(targets.len());
    for target in targets {
        reports.push(SweepReport {
            id: target.id,
            changes: git.changes(&target.work_area).await,
        });
    }
    reports
}
