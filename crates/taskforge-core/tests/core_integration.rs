#![allow(clippy::unwrap_used, clippy::expect_used)]

use taskforge_core::*;

// ---------------------------------------------------------------------------
// 1. QueueId display and ordering
// ---------------------------------------------------------------------------

#[test]
fn queue_id_display_and_order() {
    assert_eq!(QueueId(1).to_string(), "task_1");
    assert_eq!(QueueId(42).to_string(), "task_42");
    assert!(QueueId(1) < QueueId(2));

    // Serialized transparently as the inner counter
    let json = serde_json::to_string(&QueueId(7)).unwrap();
    assert_eq!(json, "7");
    let parsed: QueueId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, QueueId(7));
}

// ---------------------------------------------------------------------------
// 2. Error Display and From impls
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_from_impls() {
    let full = TaskforgeError::QueueFull { capacity: 10 };
    assert_eq!(full.to_string(), "Task queue is full (capacity 10)");

    let timeout = TaskforgeError::TaskTimeout(QueueId(3));
    assert_eq!(timeout.to_string(), "Task task_3 execution timeout");

    let exhausted = TaskforgeError::RetryExhausted {
        queue_id: QueueId(5),
        retries: 2,
        last_error: "boom".into(),
    };
    assert_eq!(
        exhausted.to_string(),
        "Task task_5 failed after 2 retries: boom"
    );

    let invalid = TaskforgeError::InvalidTransition {
        queue_id: QueueId(9),
        expected: "running",
    };
    assert_eq!(
        invalid.to_string(),
        "Invalid transition: task task_9 is not running"
    );

    let cycle = TaskforgeError::DependencyCycle("a -> b -> a".into());
    assert_eq!(cycle.to_string(), "Dependency cycle: a -> b -> a");

    // From<serde_json::Error> conversion
    let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let err: TaskforgeError = serde_err.into();
    assert!(err.to_string().starts_with("JSON error:"));

    // From<std::io::Error> conversion
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err: TaskforgeError = io_err.into();
    assert!(err.to_string().starts_with("IO error:"));
}

// ---------------------------------------------------------------------------
// 3. Terminal classification
// ---------------------------------------------------------------------------

#[test]
fn terminal_errors() {
    assert!(TaskforgeError::DependencyCycle("x".into()).is_terminal());
    assert!(TaskforgeError::RetryExhausted {
        queue_id: QueueId(1),
        retries: 3,
        last_error: "e".into(),
    }
    .is_terminal());
    assert!(!TaskforgeError::QueueFull { capacity: 1 }.is_terminal());
    assert!(!TaskforgeError::TaskTimeout(QueueId(1)).is_terminal());
}
