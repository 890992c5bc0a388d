//! Import mutator tests: one transaction per import run.

mod common;

use chrono::Utc;
use common::fixtures::TaskBuilder;
use common::test_db;
use taskstore::StoreError;
use taskstore::model::{Status, TaskUpdate};

#[test]
fn import_updates_existing_tasks_in_place() {
    let mut storage = test_db();
    let a = TaskBuilder::new("A")
        .with_labels(&["old"])
        .create(&mut storage);
    let b = TaskBuilder::new("B").create(&mut storage);
    let c = TaskBuilder::new("C").create(&mut storage);
    storage.add_dependency(&a.id, &b.id).unwrap();

    let now = Utc::now();
    let created = storage
        .run_import(|m| {
            m.update_task(
                &a.id,
                &TaskUpdate {
                    status: Some(Status::Closed),
                    notes: Some("imported".to_string()),
                    ..TaskUpdate::default()
                },
                now,
            )?;
            m.replace_labels(&a.id, &["New".to_string(), "shiny".to_string()])?;
            m.remove_dependencies(&a.id)?;
            m.add_dependency(&a.id, &c.id)?;

            let fresh = TaskBuilder::new("Imported").build();
            m.create_task(&fresh, &["import".to_string()], &[a.id.clone()])
        })
        .unwrap();

    let a = storage.get_task(&a.id).unwrap().unwrap();
    assert_eq!(a.status, Status::Closed);
    assert_eq!(a.closed_at, Some(now));
    assert_eq!(a.notes, "imported");
    assert_eq!(storage.get_labels(&a.id).unwrap(), vec!["new", "shiny"]);

    let parents: Vec<String> = storage
        .get_dependencies(&a.id)
        .unwrap()
        .into_iter()
        .map(|d| d.parent_id)
        .collect();
    assert_eq!(parents, vec![c.id]);

    let imported = storage.get_task(&created).unwrap().unwrap();
    assert_eq!(imported.title, "Imported");
    assert_eq!(storage.get_dependents(&a.id).unwrap()[0].child_id, created);
}

#[test]
fn import_error_leaves_store_untouched() {
    let mut storage = test_db();
    let a = TaskBuilder::new("A").with_labels(&["keep"]).create(&mut storage);

    let result: taskstore::Result<()> = storage.run_import(|m| {
        m.replace_labels(&a.id, &[])?;
        m.create_task(&TaskBuilder::new("Temp").build(), &[], &[])?;
        m.add_dependency(&a.id, &a.id)?;
        Ok(())
    });

    assert!(matches!(result, Err(StoreError::Validation { .. })));
    assert_eq!(storage.get_labels(&a.id).unwrap(), vec!["keep"]);
    let total: i64 = storage
        .connection()
        .query_row("SELECT count(*) FROM tasks", [], |row| row.get(0))
        .unwrap();
    assert_eq!(total, 1);
}

#[test]
fn import_generates_ids_with_configured_prefix() {
    let mut storage = test_db();
    let mut task = TaskBuilder::new("No id").build();
    task.id.clear();

    let id = storage
        .run_import(|m| m.create_task(&task, &[], &[]))
        .unwrap();
    assert!(id.starts_with("ts-"));
    assert!(storage.task_exists(&id).unwrap());
}
