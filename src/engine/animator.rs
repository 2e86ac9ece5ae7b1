use super::poller::cancelled;
use crate::model::{JobEvent, PhaseScript};
use tokio::sync::{mpsc, watch};

/// Play one phase: mark it active, emit each message after `duration / N`, then mark it
/// complete. Purely cosmetic; never looks at backend state.
///
/// Returns `false` if cancelled before the phase finished.
pub(crate) async fn play_phase(
    script: &PhaseScript,
    event_tx: &mpsc::UnboundedSender<JobEvent>,
    cancel_rx: &mut watch::Receiver<bool>,
) -> bool {
    let interval = script.message_interval();
    let _ = event_tx.send(JobEvent::PhaseStarted {
        phase: script.phase,
    });

    for message in &script.messages {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancelled(cancel_rx) => return false,
        }
        let _ = event_tx.send(JobEvent::PhaseMessage {
            phase: script.phase,
            message: message.clone(),
        });
    }

    let _ = event_tx.send(JobEvent::PhaseCompleted {
        phase: script.phase,
    });
    true
}

/// Play every phase in order. Stops as soon as cancellation is requested.
pub(crate) async fn play_all(
    scripts: Vec<PhaseScript>,
    event_tx: mpsc::UnboundedSender<JobEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    for script in &scripts {
        let already_cancelled = *cancel_rx.borrow();
        if already_cancelled || !play_phase(script, &event_tx, &mut cancel_rx).await {
            tracing::debug!(phase = ?script.phase, "phase animation cancelled");
            return;
        }
    }
}
