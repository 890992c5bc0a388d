//! Storage tests for the task repository.
//!
//! Tests: create/batch atomicity, partial updates, list filters, full-text
//! search, spec id pattern pagination, close/reopen all-or-nothing, cleanup
//! and the stale query. Real `SQLite`, no mocks.

mod common;

use chrono::{Duration, Utc};
use common::fixtures::{TaskBuilder, next_id};
use common::{test_db, test_db_with_dir};
use taskstore::StoreError;
use taskstore::model::{Status, TaskType, TaskUpdate};
use taskstore::storage::{ListFilter, ReadyFilter, SqliteStorage};

fn list_ids(storage: &SqliteStorage, filter: &ListFilter) -> Vec<String> {
    storage
        .list_tasks(filter)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect()
}

fn count_rows(storage: &SqliteStorage, sql: &str) -> i64 {
    storage
        .connection()
        .query_row(sql, [], |row| row.get(0))
        .unwrap()
}

// ============================================================================
// CREATE / BATCH
// ============================================================================

#[test]
fn batch_create_is_all_or_nothing() {
    let mut storage = test_db();
    let existing = TaskBuilder::new("Existing").create(&mut storage);

    let batch = vec![
        TaskBuilder::new("New one").into_new_task(),
        TaskBuilder::new("Duplicate").with_id(&existing.id).into_new_task(),
    ];
    let first_id = batch[0].task.id.clone();

    let err = storage.create_tasks(&batch).unwrap_err();
    assert!(matches!(err, StoreError::Database(_)));
    assert!(storage.get_task(&first_id).unwrap().is_none());
    assert_eq!(count_rows(&storage, "SELECT count(*) FROM tasks"), 1);
}

#[test]
fn batch_create_with_labels_and_forward_dependencies() {
    let mut storage = test_db();
    let child = TaskBuilder::new("Child")
        .with_labels(&["API", "backend", " api "])
        .blocked_by("ts-batch-parent");
    let parent = TaskBuilder::new("Parent").with_id("ts-batch-parent");

    let ids = storage
        .create_tasks(&[child.into_new_task(), parent.into_new_task()])
        .unwrap();

    assert_eq!(ids.len(), 2);
    assert_eq!(storage.get_labels(&ids[0]).unwrap(), vec!["api", "backend"]);
    let deps = storage.get_dependencies(&ids[0]).unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].parent_id, "ts-batch-parent");
}

#[test]
fn create_rejects_empty_title_and_bad_priority() {
    let mut storage = test_db();

    let untitled = TaskBuilder::new("   ").build();
    assert!(matches!(
        storage.create_task(&untitled, &[], &[]),
        Err(StoreError::Validation { .. })
    ));

    let bad_priority = TaskBuilder::new("Too urgent").with_priority(9).build();
    assert!(matches!(
        storage.create_task(&bad_priority, &[], &[]),
        Err(StoreError::Validation { .. })
    ));
}

#[test]
fn on_disk_store_persists_across_reopen() {
    let (mut storage, dir) = test_db_with_dir();
    let task = TaskBuilder::new("Durable").create(&mut storage);
    drop(storage);

    let reopened = SqliteStorage::open(&dir.path().join(".taskstore").join("tasks.db")).unwrap();
    assert_eq!(reopened.get_task(&task.id).unwrap().unwrap(), task);
}

// ============================================================================
// UPDATE
// ============================================================================

#[test]
fn update_distinguishes_omitted_from_empty() {
    let mut storage = test_db();
    let task = TaskBuilder::new("Update me")
        .with_assignee("alice")
        .with_description("keep")
        .create(&mut storage);

    let later = task.updated_at + Duration::minutes(1);
    let updated = storage
        .update_task(
            &task.id,
            &TaskUpdate {
                assignee: Some(String::new()),
                task_type: Some(TaskType::Bug),
                ..TaskUpdate::default()
            },
            later,
        )
        .unwrap();

    assert!(updated.assignee.is_none());
    assert_eq!(updated.description, "keep");
    assert_eq!(updated.task_type, TaskType::Bug);
    assert_eq!(updated.updated_at, later);
}

#[test]
fn empty_update_still_refreshes_updated_at() {
    let mut storage = test_db();
    let task = TaskBuilder::new("Touch").days_ago(3).create(&mut storage);
    let now = Utc::now();

    let touched = storage
        .update_task(&task.id, &TaskUpdate::default(), now)
        .unwrap();
    assert_eq!(touched.updated_at, now);
    assert_eq!(touched.title, "Touch");
}

// ============================================================================
// LIST FILTERS
// ============================================================================

#[test]
fn list_orders_by_updated_desc() {
    let mut storage = test_db();
    let old = TaskBuilder::new("Old").days_ago(5).create(&mut storage);
    let new = TaskBuilder::new("New").days_ago(1).create(&mut storage);
    let mid = TaskBuilder::new("Mid").days_ago(3).create(&mut storage);

    let ids = list_ids(&storage, &ListFilter::default());
    assert_eq!(ids, vec![new.id, mid.id, old.id]);
}

#[test]
fn list_filters_combine_as_conjunction() {
    let mut storage = test_db();
    let hit = TaskBuilder::new("Login page crashes")
        .with_type(TaskType::Bug)
        .with_priority(1)
        .with_assignee("alice")
        .with_labels(&["frontend", "urgent"])
        .create(&mut storage);
    TaskBuilder::new("Login page style")
        .with_type(TaskType::Bug)
        .with_priority(3)
        .with_assignee("alice")
        .with_labels(&["frontend"])
        .create(&mut storage);
    TaskBuilder::new("Login API")
        .with_type(TaskType::Feature)
        .with_priority(1)
        .create(&mut storage);

    let filter = ListFilter {
        types: vec![TaskType::Bug],
        priority_max: Some(taskstore::model::Priority::HIGH),
        assignee: Some("alice".to_string()),
        labels_all: vec!["Frontend".to_string(), "urgent".to_string()],
        title_contains: Some("login".to_string()),
        ..ListFilter::default()
    };
    assert_eq!(list_ids(&storage, &filter), vec![hit.id]);
}

#[test]
fn list_label_any_and_no_labels() {
    let mut storage = test_db();
    let a = TaskBuilder::new("A").with_labels(&["x"]).create(&mut storage);
    let b = TaskBuilder::new("B").with_labels(&["y"]).create(&mut storage);
    let bare = TaskBuilder::new("Bare").create(&mut storage);

    let mut any = list_ids(
        &storage,
        &ListFilter {
            labels_any: vec!["x".to_string(), "y".to_string()],
            ..ListFilter::default()
        },
    );
    any.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(any, expected);

    let none = list_ids(
        &storage,
        &ListFilter {
            no_labels: true,
            ..ListFilter::default()
        },
    );
    assert_eq!(none, vec![bare.id]);
}

#[test]
fn list_unassigned_and_empty_description() {
    let mut storage = test_db();
    let assigned = TaskBuilder::new("Assigned")
        .with_assignee("bob")
        .with_description("has text")
        .create(&mut storage);
    let open = TaskBuilder::new("Unassigned").create(&mut storage);

    let unassigned = list_ids(
        &storage,
        &ListFilter {
            unassigned: true,
            ..ListFilter::default()
        },
    );
    assert_eq!(unassigned, vec![open.id.clone()]);

    let empty = list_ids(
        &storage,
        &ListFilter {
            empty_description: true,
            ..ListFilter::default()
        },
    );
    assert_eq!(empty, vec![open.id]);
    assert!(!empty.contains(&assigned.id));
}

#[test]
fn list_time_ranges() {
    let mut storage = test_db();
    let old = TaskBuilder::new("Old").days_ago(10).create(&mut storage);
    let recent = TaskBuilder::new("Recent").days_ago(1).create(&mut storage);

    let cutoff = Utc::now() - Duration::days(5);
    assert_eq!(
        list_ids(
            &storage,
            &ListFilter {
                created_before: Some(cutoff),
                ..ListFilter::default()
            }
        ),
        vec![old.id]
    );
    assert_eq!(
        list_ids(
            &storage,
            &ListFilter {
                updated_after: Some(cutoff),
                ..ListFilter::default()
            }
        ),
        vec![recent.id]
    );
}

#[test]
fn like_filter_treats_wildcards_literally() {
    let mut storage = test_db();
    let percent = TaskBuilder::new("Cut 50% of latency").create(&mut storage);
    TaskBuilder::new("Cut 500 ms of latency").create(&mut storage);

    let ids = list_ids(
        &storage,
        &ListFilter {
            title_contains: Some("50%".to_string()),
            ..ListFilter::default()
        },
    );
    assert_eq!(ids, vec![percent.id]);
}

#[test]
fn full_text_search_ranks_matches() {
    let mut storage = test_db();
    let strong = TaskBuilder::new("Database migration")
        .with_description("migration of the database schema, migration tooling")
        .create(&mut storage);
    let weak = TaskBuilder::new("Refactor logging")
        .with_notes("touches one migration helper")
        .create(&mut storage);
    TaskBuilder::new("Unrelated").create(&mut storage);

    let ids = list_ids(
        &storage,
        &ListFilter {
            query: Some("migration".to_string()),
            ..ListFilter::default()
        },
    );
    assert_eq!(ids, vec![strong.id, weak.id]);
}

#[test]
fn full_text_search_tolerates_operator_characters() {
    let mut storage = test_db();
    TaskBuilder::new("Fix \"quoted\" title AND more").create(&mut storage);

    let result = storage.list_tasks(&ListFilter {
        query: Some("\"quoted AND (".to_string()),
        ..ListFilter::default()
    });
    assert!(result.is_ok());
}

#[test]
fn search_index_follows_updates_and_deletes() {
    let mut storage = test_db();
    let task = TaskBuilder::new("Alpha keyword").create(&mut storage);
    storage
        .update_task(
            &task.id,
            &TaskUpdate {
                title: Some("Beta keyword".to_string()),
                ..TaskUpdate::default()
            },
            Utc::now(),
        )
        .unwrap();

    let search = |storage: &SqliteStorage, q: &str| {
        list_ids(
            storage,
            &ListFilter {
                query: Some(q.to_string()),
                ..ListFilter::default()
            },
        )
    };
    assert!(search(&storage, "alpha").is_empty());
    assert_eq!(search(&storage, "beta"), vec![task.id.clone()]);
}

#[test]
fn spec_id_pattern_paginates_after_matching() {
    let mut storage = test_db();
    // Newest first: matching tasks interleaved with non-matching ones.
    let mut matching = Vec::new();
    for day in 0..6 {
        let builder = TaskBuilder::new(&format!("Task {day}")).days_ago(day);
        let builder = if day % 2 == 0 {
            builder.with_spec_id(&format!("SPEC-{day}"))
        } else {
            builder.with_spec_id(&format!("other-{day}"))
        };
        let task = builder.create(&mut storage);
        if day % 2 == 0 {
            matching.push(task.id);
        }
    }

    let page = list_ids(
        &storage,
        &ListFilter {
            spec_id_pattern: Some("^SPEC-\\d+$".to_string()),
            offset: Some(1),
            limit: Some(1),
            ..ListFilter::default()
        },
    );
    assert_eq!(page, vec![matching[1].clone()]);
}

#[test]
fn invalid_spec_id_pattern_is_validation_error() {
    let storage = test_db();
    let err = storage
        .list_tasks(&ListFilter {
            spec_id_pattern: Some("([".to_string()),
            ..ListFilter::default()
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }));
}

#[test]
fn limit_and_offset_page_through_results() {
    let mut storage = test_db();
    let ids: Vec<String> = (0..5)
        .map(|i| {
            TaskBuilder::new(&format!("Page {i}"))
                .days_ago(i)
                .create(&mut storage)
                .id
        })
        .collect();

    let page = list_ids(
        &storage,
        &ListFilter {
            limit: Some(2),
            offset: Some(2),
            ..ListFilter::default()
        },
    );
    assert_eq!(page, ids[2..4].to_vec());
}

#[test]
fn oversized_limit_and_offset_are_clamped() {
    let mut storage = test_db();
    let task = TaskBuilder::new("Only one").create(&mut storage);

    let everything = list_ids(
        &storage,
        &ListFilter {
            limit: Some(usize::MAX),
            ..ListFilter::default()
        },
    );
    assert_eq!(everything, vec![task.id]);

    let past_the_end = list_ids(
        &storage,
        &ListFilter {
            limit: Some(usize::MAX),
            offset: Some(usize::MAX),
            ..ListFilter::default()
        },
    );
    assert!(past_the_end.is_empty());

    let ready = storage
        .get_ready_tasks(&ReadyFilter {
            limit: Some(usize::MAX),
            ..ReadyFilter::default()
        })
        .unwrap();
    assert_eq!(ready.len(), 1);
}

// ============================================================================
// CLOSE / REOPEN
// ============================================================================

#[test]
fn close_with_missing_id_changes_nothing() {
    let mut storage = test_db();
    let a = TaskBuilder::new("A").create(&mut storage);
    let missing = next_id();

    let err = storage
        .close_tasks(&[a.id.clone(), missing.clone()], Utc::now())
        .unwrap_err();
    match err {
        StoreError::TasksNotFound { ids } => assert_eq!(ids, vec![missing]),
        other => panic!("unexpected error: {other}"),
    }
    let still_open = storage.get_task(&a.id).unwrap().unwrap();
    assert_eq!(still_open.status, Status::Open);
    assert!(still_open.closed_at.is_none());
}

#[test]
fn close_and_reopen_keep_closed_at_consistent() {
    let mut storage = test_db();
    let a = TaskBuilder::new("A").create(&mut storage);
    let b = TaskBuilder::new("B").create(&mut storage);
    let ids = vec![a.id.clone(), b.id.clone(), a.id.clone()];

    let closed_at = Utc::now();
    assert_eq!(storage.close_tasks(&ids, closed_at).unwrap(), 2);
    for id in [&a.id, &b.id] {
        let task = storage.get_task(id).unwrap().unwrap();
        assert_eq!(task.status, Status::Closed);
        assert_eq!(task.closed_at, Some(closed_at));
        assert_eq!(task.updated_at, closed_at);
    }

    let reopened_at = closed_at + Duration::seconds(1);
    assert_eq!(storage.reopen_tasks(&ids, reopened_at).unwrap(), 2);
    let task = storage.get_task(&a.id).unwrap().unwrap();
    assert_eq!(task.status, Status::Open);
    assert!(task.closed_at.is_none());
    assert_eq!(task.updated_at, reopened_at);
}

// ============================================================================
// CLEANUP
// ============================================================================

#[test]
fn cleanup_dry_run_then_delete_is_idempotent() {
    let mut storage = test_db();
    let old_closed = TaskBuilder::new("Old closed")
        .with_status(Status::Closed)
        .with_labels(&["gone"])
        .days_ago(40)
        .create(&mut storage);
    let recent_closed = TaskBuilder::new("Recent closed")
        .with_status(Status::Closed)
        .days_ago(2)
        .create(&mut storage);
    let old_open = TaskBuilder::new("Old open").days_ago(40).create(&mut storage);
    let dependent = TaskBuilder::new("Dependent")
        .blocked_by(&old_closed.id)
        .create(&mut storage);

    let cutoff = Utc::now() - Duration::days(30);

    let dry = storage.cleanup_closed_tasks(cutoff, true).unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.task_ids, vec![old_closed.id.clone()]);
    assert!(storage.get_task(&old_closed.id).unwrap().is_some());

    let real = storage.cleanup_closed_tasks(cutoff, false).unwrap();
    assert_eq!(real.count, 1);
    assert!(!real.dry_run);
    assert!(storage.get_task(&old_closed.id).unwrap().is_none());
    assert!(storage.get_task(&recent_closed.id).unwrap().is_some());
    assert!(storage.get_task(&old_open.id).unwrap().is_some());

    assert_eq!(
        count_rows(&storage, "SELECT count(*) FROM labels WHERE label = 'gone'"),
        0
    );
    assert!(storage.get_dependencies(&dependent.id).unwrap().is_empty());

    let again = storage.cleanup_closed_tasks(cutoff, false).unwrap();
    assert_eq!(again.count, 0);
    assert!(again.task_ids.is_empty());
}

// ============================================================================
// STALE
// ============================================================================

#[test]
fn stale_skips_closed_by_default() {
    let mut storage = test_db();
    let stale_open = TaskBuilder::new("Stale open").days_ago(20).create(&mut storage);
    let older_open = TaskBuilder::new("Older open").days_ago(25).create(&mut storage);
    TaskBuilder::new("Stale closed")
        .with_status(Status::Closed)
        .days_ago(20)
        .create(&mut storage);
    TaskBuilder::new("Fresh").create(&mut storage);

    let cutoff = Utc::now() - Duration::days(10);
    let ids: Vec<String> = storage
        .get_stale_tasks(cutoff, &[], None)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![older_open.id, stale_open.id]);
}

#[test]
fn stale_with_explicit_statuses() {
    let mut storage = test_db();
    let closed = TaskBuilder::new("Stale closed")
        .with_status(Status::Closed)
        .days_ago(20)
        .create(&mut storage);
    TaskBuilder::new("Stale open").days_ago(20).create(&mut storage);

    let cutoff = Utc::now() - Duration::days(10);
    let tasks = storage
        .get_stale_tasks(cutoff, &[Status::Closed], Some(10))
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, closed.id);
}
