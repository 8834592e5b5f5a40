use std::time::Duration;

use chrono::{TimeZone, Utc};
use tickwork::{Cancellation, Context, SchedulerError, Task, TaskId};

#[test]
fn task_defaults() {
    let before = Utc::now();
    let task = Task::new("Test Task", Duration::from_secs(1)).unwrap();
    let after = Utc::now();

    assert!(!task.id().as_str().is_empty(), "Id should be generated");
    assert_eq!(task.name(), "Test Task");
    assert!(
        task.start() >= before && task.start() <= after,
        "Start should default to creation time"
    );
    assert_eq!(task.duration(), None, "Duration should default to none");
    assert_eq!(task.end(), None);
    assert_eq!(task.interval(), Duration::from_secs(1));
    assert!(!task.is_cancelled(), "Fresh task should not be cancelled");
    assert!(!task.contains_context("anything"), "Fresh context should be empty");
    assert_eq!(task.exit_status(), None);
}

#[test]
fn task_generated_ids_are_unique() {
    let a = Task::new("", Duration::from_secs(1)).unwrap();
    let b = Task::new("", Duration::from_secs(1)).unwrap();
    assert_ne!(a.id(), b.id(), "Generated ids should differ");
    assert_ne!(a, b, "Distinct tasks should not compare equal");
    assert_eq!(a, a.clone(), "Clones should refer to the same task");
}

#[test]
fn task_builder_custom_fields() {
    let start = Utc.with_ymd_and_hms(2000, 1, 1, 1, 2, 3).unwrap();
    let cancellation = Cancellation::new();
    let mut context = Context::new();
    context.insert("one", 1);
    context.insert("boolean", true);
    context.insert("string", "Test String".to_string());

    let task = Task::builder("Test Task", Duration::from_secs(1))
        .id("Custom ID")
        .start(start)
        .duration(Duration::from_secs(10))
        .cancellation(cancellation.clone())
        .context(context)
        .build()
        .unwrap();

    assert_eq!(task.id(), &TaskId::from("Custom ID"));
    assert_eq!(task.start(), start);
    assert_eq!(task.duration(), Some(Duration::from_secs(10)));
    assert_eq!(
        task.end(),
        Some(Utc.with_ymd_and_hms(2000, 1, 1, 1, 2, 13).unwrap())
    );
    assert_eq!(task.get_context::<i32>("one"), Some(1));
    assert_eq!(task.get_context::<bool>("boolean"), Some(true));
    assert_eq!(
        task.get_context::<String>("string"),
        Some("Test String".to_string())
    );

    cancellation.cancel();
    assert!(
        task.is_cancelled(),
        "Task should observe the cancellation it was built with"
    );
}

#[test]
fn task_zero_interval_is_rejected() {
    let r = Task::new("Zero", Duration::ZERO);
    assert!(
        matches!(r, Err(SchedulerError::InvalidConfiguration(_))),
        "Zero interval should be an invalid configuration"
    );
}

#[test]
fn task_context_round_trip() {
    let task = Task::new("", Duration::from_secs(1)).unwrap();

    task.set_context("key", "value".to_string());
    assert_eq!(task.get_context::<String>("key"), Some("value".to_string()));

    task.set_context("key", 7u8);
    assert_eq!(task.get_context::<u8>("key"), Some(7), "Set should overwrite");
    assert_eq!(
        task.get_context::<String>("key"),
        None,
        "Lookup with the wrong type should behave as absent"
    );

    task.remove_context("key");
    assert_eq!(task.get_context::<u8>("key"), None);
    assert!(!task.contains_context("key"));

    // Removing an absent key is a no-op.
    task.remove_context("key");
}

#[test]
fn task_with_context_counter() {
    let task = Task::new("counter", Duration::from_secs(1)).unwrap();
    let bump = || {
        task.with_context(|ctx| match ctx.get_mut::<u32>("counter") {
            Some(counter) => *counter += 1,
            None => ctx.insert("counter", 0u32),
        })
    };
    for _ in 0..4 {
        bump();
    }
    assert_eq!(task.get_context::<u32>("counter"), Some(3));
}

#[test]
fn task_describe() {
    let start = Utc.with_ymd_and_hms(2000, 1, 1, 1, 2, 3).unwrap();
    let task = Task::builder("Test Task", Duration::from_secs(1))
        .id("Custom ID")
        .start(start)
        .duration(Duration::from_secs(10))
        .build()
        .unwrap();
    task.set_context("one", 1);
    task.set_context("boolean", true);

    let expected = format!(
        "ID: Custom ID\nName: Test Task\nStart: {start}\nDuration: 10s\nInterval: 1s\nContext: {{\"boolean\": true, \"one\": 1}}"
    );
    assert_eq!(task.describe(), expected);
    assert_eq!(task.to_string(), expected);

    let endless = Task::new("Endless", Duration::from_millis(500)).unwrap();
    assert!(endless.describe().contains("Duration: none\nInterval: 500ms\nContext: {}"));
}

#[test]
fn task_info_serializes() {
    let start = Utc.with_ymd_and_hms(2000, 1, 1, 1, 2, 3).unwrap();
    let task = Task::builder("Test Task", Duration::from_millis(1500))
        .id("Custom ID")
        .start(start)
        .build()
        .unwrap();
    task.set_context("secret", 1);

    let json = serde_json::to_value(task.info()).unwrap();
    assert_eq!(json["id"], "Custom ID");
    assert_eq!(json["name"], "Test Task");
    assert_eq!(json["start"], "2000-01-01T01:02:03Z");
    assert!(json["duration"].is_null());
    assert_eq!(json["interval"]["secs"], 1);
    assert_eq!(json["interval"]["nanos"], 500_000_000);
    assert!(
        json.get("context").is_none(),
        "Context values are not part of the task info"
    );
}

#[test]
fn cancellation_is_idempotent() {
    let cancellation = Cancellation::new();
    let observer = cancellation.clone();
    assert!(!observer.is_cancelled());

    cancellation.cancel();
    cancellation.cancel();
    assert!(observer.is_cancelled());
    futures::executor::block_on(observer.cancelled());
}

#[test]
fn cancellation_interrupts_future() {
    let cancellation = Cancellation::new();
    cancellation.cancel();
    let r = futures::executor::block_on(cancellation.run_until_cancelled(async { 1 }));
    assert_eq!(r, None, "Cancelled signal should win over a ready future");

    let fresh = Cancellation::new();
    let r = futures::executor::block_on(fresh.run_until_cancelled(async { 1 }));
    assert_eq!(r, Some(1));
}
