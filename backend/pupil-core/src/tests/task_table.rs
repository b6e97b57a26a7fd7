use crate::control::{HostEnd, pipe};
use crate::error::task::TaskError;
use crate::protocol::status::{STATUS_PENDING, STATUS_UNSPECIFIED};
use crate::protocol::{ActionKind, TaskId, TaskResponse};
use crate::task_table::{StatusResponse, TaskTable};

use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

fn table() -> (TaskTable, HostEnd) {
    let (script, host) = pipe();
    (TaskTable::new(Box::new(script)), host)
}

#[test]
fn given_new_task_when_polled_before_any_reply_then_reports_pending_unchanged() {
    // GIVEN: A freshly registered task
    let (table, _host) = table();
    let status = table
        .create_callback(TaskId::new(), ActionKind::Calibration)
        .unwrap();

    // WHEN: Polling with nothing on the channel
    let response = status.poll();

    // THEN: Pending, and not flagged as a change
    assert!(!response.changed);
    assert_eq!(response.status_code, STATUS_PENDING);
    assert_eq!(response.status, "pending");
    assert!(!response.is_finished());
}

#[test]
fn given_tracked_id_when_registered_again_then_rejected_as_duplicate() {
    // GIVEN: A tracked task
    let (table, _host) = table();
    let id = TaskId::new();
    table.create_callback(id, ActionKind::Recording).unwrap();

    // WHEN: Registering the same id again
    let result = table.create_callback(id, ActionKind::Recording);

    // THEN: Duplicate error naming the id
    match result {
        Err(TaskError::Duplicate { task_id, .. }) => assert_eq!(task_id, id),
        Ok(_) => panic!("Expected Duplicate, got a callback"),
    }
}

/// **VALUE**: Verifies a terminal status is delivered once and then forgotten.
///
/// **WHY THIS MATTERS**: Scripts loop on their status callback until it reports a
/// terminal code. The table must not grow with every finished task, and a stale
/// callback must not keep reporting success forever.
///
/// **BUG THIS CATCHES**: Would catch a table that never removes finished tasks, or
/// one that removes them before the owner has seen the terminal response.
#[test]
fn given_terminal_reply_when_consumed_then_next_call_returns_unspecified() {
    // GIVEN: A task whose terminal reply is on the channel
    let (table, host) = table();
    let id = TaskId::new();
    let status = table.create_callback(id, ActionKind::Recording).unwrap();
    host.send_response(&TaskResponse::new(id, "recording stopped", 0, Some(json!("/tmp/r1"))))
        .unwrap();

    // WHEN: Waiting for it, then asking again
    let finished = status.wait(Some(Duration::from_secs(1)));
    let after = status.poll();

    // THEN: The terminal reply is delivered once, then the task is gone
    assert!(finished.changed);
    assert_eq!(finished.status_code, 0);
    assert_eq!(finished.result, Some(json!("/tmp/r1")));
    assert!(finished.is_success());
    assert_eq!(after, StatusResponse::unspecified());
    assert!(!table.is_tracked(id));
}

/// **VALUE**: Verifies interleaved replies are filed under their own task.
///
/// **WHY THIS MATTERS**: Calibration and recording replies share one channel. Whoever
/// polls first reads both; the other task's reply must wait in the table.
///
/// **BUG THIS CATCHES**: Would catch a poll that discards, overwrites, or consumes
/// replies belonging to a different task id.
#[test]
fn given_interleaved_replies_when_polling_one_task_then_other_task_state_is_kept() {
    // GIVEN: Two tasks with a reply for each, X's first
    let (table, host) = table();
    let x = TaskId::new();
    let y = TaskId::new();
    let status_x = table.create_callback(x, ActionKind::Calibration).unwrap();
    let status_y = table.create_callback(y, ActionKind::Recording).unwrap();
    host.send_response(&TaskResponse::new(x, "calibration marker found", 12, None))
        .unwrap();
    host.send_response(&TaskResponse::new(y, "recording stopped", 0, None))
        .unwrap();

    // WHEN: Y polls first
    let response_y = status_y.wait(Some(Duration::from_secs(1)));

    // THEN: Y gets its own reply and X's reply waits in the table
    assert_eq!(response_y.status_code, 0);
    assert!(table.is_tracked(x));
    assert!(!table.is_tracked(y));

    let response_x = status_x.poll();
    assert!(response_x.changed);
    assert_eq!(response_x.status_code, 12);
    assert_eq!(response_x.status, "calibration marker found");

    // AND: Asking again without news reports the same state as unchanged
    let repeat_x = status_x.poll();
    assert!(!repeat_x.changed);
    assert_eq!(repeat_x.status_code, 12);
    assert!(table.is_tracked(x), "Progress codes never clean up");
}

#[test]
fn given_malformed_and_id_less_frames_when_polling_then_they_are_skipped() {
    // GIVEN: Garbage, an id-less reply, then the real reply
    let (table, host) = table();
    let id = TaskId::new();
    let status = table.create_callback(id, ActionKind::Calibration).unwrap();
    host.send_raw("not json at all").unwrap();
    host.send_raw(r#"{"status":"orphan","statusCode":0}"#).unwrap();
    host.send_response(&TaskResponse::new(id, "calibration marker sample completed", 11, None))
        .unwrap();

    // WHEN: Waiting for our reply
    let response = status.wait(Some(Duration::from_secs(1)));

    // THEN: Only the real reply counts
    assert!(response.changed);
    assert_eq!(response.status_code, 11);
}

#[test]
fn given_reply_for_untracked_id_when_polling_then_no_entry_is_created() {
    let (table, host) = table();
    let id = TaskId::new();
    let status = table.create_callback(id, ActionKind::Calibration).unwrap();
    host.send_response(&TaskResponse::new(TaskId::new(), "stray", 0, None))
        .unwrap();

    let response = status.poll();

    assert!(!response.changed);
    assert_eq!(table.len(), 1);
}

#[test]
fn given_silent_host_when_waiting_with_timeout_then_returns_last_snapshot_after_timeout() {
    // GIVEN: A task the host never answers
    let (table, _host) = table();
    let status = table
        .create_callback(TaskId::new(), ActionKind::Calibration)
        .unwrap();

    // WHEN: Waiting 50 ms
    let started = Instant::now();
    let response = status.wait(Some(Duration::from_millis(50)));

    // THEN: Pending after at least the timeout
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(response.status_code, STATUS_PENDING);
}

/// **VALUE**: Verifies a dead channel ends the poll instead of erroring or hanging.
///
/// **BUG THIS CATCHES**: Would catch a blocking wait that spins forever once the
/// host has hung up.
#[test]
fn given_host_hung_up_when_waiting_without_timeout_then_returns_last_snapshot() {
    // GIVEN: A task whose host end is gone
    let (table, host) = table();
    let status = table
        .create_callback(TaskId::new(), ActionKind::Recording)
        .unwrap();
    drop(host);

    // WHEN: Waiting indefinitely
    let response = status.wait(None);

    // THEN: The pending snapshot comes back
    assert_eq!(response.status_code, STATUS_PENDING);
}

/// **VALUE**: Verifies waiting for a task to finish gives up as soon as the host
/// is gone.
///
/// **WHY THIS MATTERS**: Scripts wait up to minutes for a calibration. A crashed host
/// must not turn that wait into a busy loop that floods the log.
///
/// **BUG THIS CATCHES**: Would catch a wait that keeps re-polling a closed channel
/// until its deadline, or forever without one.
#[test]
fn given_host_hung_up_when_waiting_until_finished_then_returns_before_timeout() {
    // GIVEN: A pending task whose host end is gone
    let (table, host) = table();
    let status = table
        .create_callback(TaskId::new(), ActionKind::Calibration)
        .unwrap();
    drop(host);

    // WHEN: Waiting for it to finish with a long timeout
    let started = Instant::now();
    let response = status.wait_until_finished(Some(Duration::from_secs(5)));

    // THEN: It returns the last snapshot promptly and the table knows why
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "Waited {:?} on a closed channel",
        started.elapsed()
    );
    assert_eq!(response.status_code, STATUS_PENDING);
    assert!(table.is_channel_closed());
}

#[test]
fn given_host_hung_up_when_waiting_until_finished_without_timeout_then_returns() {
    // GIVEN: A pending task whose host end is gone
    let (table, host) = table();
    let status = table
        .create_callback(TaskId::new(), ActionKind::Calibration)
        .unwrap();
    drop(host);

    // WHEN: Waiting without a timeout on another thread
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let response = status.wait_until_finished(None);
        let _ = done_tx.send(response.status_code);
    });

    // THEN: The wait ends on its own
    assert_eq!(
        done_rx.recv_timeout(Duration::from_secs(2)),
        Ok(STATUS_PENDING),
        "wait_until_finished(None) never returned after the host hung up"
    );
}

#[test]
fn given_terminal_reply_before_hang_up_when_waiting_until_finished_then_reply_is_returned() {
    // GIVEN: The host answered and then went away
    let (table, host) = table();
    let id = TaskId::new();
    let status = table.create_callback(id, ActionKind::Recording).unwrap();
    host.send_response(&TaskResponse::new(
        id,
        "recording stopped",
        0,
        Some(json!("/tmp/r1")),
    ))
    .unwrap();
    drop(host);

    // WHEN: Waiting for the task to finish
    let response = status.wait_until_finished(Some(Duration::from_secs(1)));

    // THEN: The buffered reply wins over the hang-up
    assert_eq!(response.status_code, 0);
    assert_eq!(response.result, Some(json!("/tmp/r1")));
}

#[test]
fn given_progress_then_failure_when_waiting_until_finished_then_returns_failure() {
    // GIVEN: Progress updates followed by a failure
    let (table, host) = table();
    let id = TaskId::new();
    let status = table.create_callback(id, ActionKind::Calibration).unwrap();
    for (text, code) in [
        ("calibration marker found", 12),
        ("calibration marker sample completed", 11),
    ] {
        host.send_response(&TaskResponse::new(id, text, code, None))
            .unwrap();
    }
    host.send_response(&TaskResponse::new(
        id,
        "calibration failed",
        -11,
        Some(json!("timeout")),
    ))
    .unwrap();

    // WHEN: Waiting for the task to finish
    let response = status.wait_until_finished(Some(Duration::from_secs(1)));

    // THEN: The failure is the final word
    assert_eq!(response.status_code, -11);
    assert_eq!(response.result, Some(json!("timeout")));
    assert_eq!(status.poll().status_code, STATUS_UNSPECIFIED);
}
