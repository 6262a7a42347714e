//! Assertion helpers over workflows and event streams.

use mdk_protocol::ipc::Event;
use mdk_protocol::{StageName, StageStatus, Workflow};
use tokio::sync::mpsc;

/// Assert the status of one stage, with the whole map in the message.
#[allow(dead_code)]
pub fn assert_stage_status(workflow: &Workflow, stage: StageName, expected: StageStatus) {
    assert_eq!(
        workflow.status_of(stage),
        expected,
        "unexpected status for {stage}: {:?}",
        workflow.stage_status
    );
}

/// Number of records for `stage`, i.e. how often it was launched.
#[allow(dead_code)]
pub fn launches(workflow: &Workflow, stage: StageName) -> usize {
    workflow
        .records
        .iter()
        .filter(|record| record.stage_name == stage)
        .count()
}

/// Drain every event currently buffered in the channel.
#[allow(dead_code)]
pub fn drain_events(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The `(stage, status)` pairs of all status updates, in order.
#[allow(dead_code)]
pub fn status_updates(events: &[Event]) -> Vec<(StageName, StageStatus)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::StageStatusUpdate { stage, status, .. } => Some((*stage, *status)),
            _ => None,
        })
        .collect()
}

/// Wait for the first event matching `predicate`, failing after five seconds.
#[allow(dead_code)]
pub async fn wait_for_event<F>(rx: &mut mpsc::Receiver<Event>, mut predicate: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(event)) if predicate(&event) => return event,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("Event channel closed before the expected event"),
            Err(_) => panic!("Timed out waiting for event"),
        }
    }
}
