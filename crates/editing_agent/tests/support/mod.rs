#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use editing_agent::runtime::EditorRuntime;
use editing_agent::UiEvent;
use serde_json::{json, Value};

pub fn sample_document() -> Value {
    json!({
        "title": "Landing",
        "content": [
            {
                "id": "sec1",
                "elType": "section",
                "elements": [
                    {
                        "id": "col1",
                        "elType": "column",
                        "elements": [
                            {
                                "id": "w1",
                                "elType": "widget",
                                "widgetType": "heading",
                                "settings": { "title": "Welcome home" }
                            },
                            {
                                "id": "w2",
                                "elType": "widget",
                                "widgetType": "button",
                                "settings": { "text": "Buy now" }
                            }
                        ]
                    }
                ]
            }
        ]
    })
}

pub const HEADING_TITLE_PATH: &str = "/content/0/elements/0/elements/0/settings/title";

pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return predicate();
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Drains runtime events into `sink` until a terminal turn event shows up.
pub fn wait_for_turn_end(runtime: &EditorRuntime, sink: &mut Vec<UiEvent>) -> bool {
    wait_until(Duration::from_secs(5), || {
        sink.extend(runtime.drain_events());
        sink.iter().any(is_terminal_event)
    })
}

pub fn is_terminal_event(event: &UiEvent) -> bool {
    matches!(
        event,
        UiEvent::TurnCompleted { .. } | UiEvent::LoopAborted { .. } | UiEvent::TurnFailed { .. }
    )
}

/// Submits once the previous worker has been reaped; a fresh runtime
/// accepts immediately.
pub fn submit_when_ready(runtime: &Arc<EditorRuntime>, text: &str) -> u64 {
    let mut turn_id = None;
    let submitted = wait_until(Duration::from_secs(5), || match runtime.submit(text) {
        Ok(id) => {
            turn_id = Some(id);
            true
        }
        Err(_) => false,
    });
    assert!(submitted, "runtime did not accept the submission in time");
    turn_id.expect("submission succeeded")
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
