//! Dependency graph tests: edge maintenance, tree walks and batch lookups.

mod common;

use common::fixtures::TaskBuilder;
use common::test_db;
use taskstore::StoreError;
use taskstore::config::StorageOptions;
use taskstore::model::{DependencyType, Status, TreeDirection, TreeNode};
use taskstore::storage::SqliteStorage;

fn create(storage: &mut SqliteStorage, id: &str) {
    TaskBuilder::new(&format!("Task {id}"))
        .with_id(id)
        .create(storage);
}

fn summary(nodes: &[TreeNode]) -> Vec<(TreeDirection, usize, String)> {
    nodes
        .iter()
        .map(|n| (n.direction, n.depth, n.id.clone()))
        .collect()
}

#[test]
fn tree_walks_both_directions() {
    let mut storage = test_db();
    for id in ["A", "B", "C"] {
        create(&mut storage, id);
    }
    storage.add_dependency("A", "B").unwrap();
    storage.add_dependency("B", "C").unwrap();

    let from_b = storage.get_dependency_tree("B").unwrap();
    assert_eq!(
        summary(&from_b),
        vec![
            (TreeDirection::Downstream, 1, "A".to_string()),
            (TreeDirection::Upstream, 1, "C".to_string()),
        ]
    );
    assert!(from_b.iter().all(|n| n.edge_type == DependencyType::Blocks));
    assert_eq!(from_b[0].title, "Task A");
    assert_eq!(from_b[0].status, Status::Open);

    let from_c = storage.get_dependency_tree("C").unwrap();
    assert_eq!(
        summary(&from_c),
        vec![
            (TreeDirection::Downstream, 1, "B".to_string()),
            (TreeDirection::Downstream, 2, "A".to_string()),
        ]
    );
}

#[test]
fn tree_of_isolated_task_is_empty() {
    let mut storage = test_db();
    create(&mut storage, "lonely");
    assert!(storage.get_dependency_tree("lonely").unwrap().is_empty());
}

#[test]
fn tree_of_unknown_task_is_not_found() {
    let storage = test_db();
    let err = storage.get_dependency_tree("ts-missing").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn tree_terminates_on_cycles() {
    let mut storage = test_db();
    for id in ["A", "B", "C"] {
        create(&mut storage, id);
    }
    storage.add_dependency("A", "B").unwrap();
    storage.add_dependency("B", "C").unwrap();
    storage.add_dependency("C", "A").unwrap();

    let nodes = storage.get_dependency_tree("A").unwrap();
    assert_eq!(
        summary(&nodes),
        vec![
            (TreeDirection::Downstream, 1, "C".to_string()),
            (TreeDirection::Downstream, 2, "B".to_string()),
            (TreeDirection::Upstream, 1, "B".to_string()),
            (TreeDirection::Upstream, 2, "C".to_string()),
        ]
    );
}

#[test]
fn tree_reaches_nodes_only_visible_through_a_later_path() {
    let mut storage = test_db();
    for id in ["O", "A", "B", "X"] {
        create(&mut storage, id);
    }
    // Diamond O -> {A, B} -> X with a back-edge X -> A.
    storage.add_dependency("O", "A").unwrap();
    storage.add_dependency("O", "B").unwrap();
    storage.add_dependency("A", "X").unwrap();
    storage.add_dependency("B", "X").unwrap();
    storage.add_dependency("X", "A").unwrap();

    let nodes = storage.get_dependency_tree("O").unwrap();
    assert_eq!(
        summary(&nodes),
        vec![
            (TreeDirection::Upstream, 1, "A".to_string()),
            (TreeDirection::Upstream, 1, "B".to_string()),
            (TreeDirection::Upstream, 2, "X".to_string()),
            (TreeDirection::Upstream, 3, "A".to_string()),
        ]
    );
}

#[test]
fn tree_depth_is_capped() {
    let mut storage = test_db();
    let ids: Vec<String> = (0..55).map(|i| format!("chain-{i:02}")).collect();
    for id in &ids {
        create(&mut storage, id);
    }
    for pair in ids.windows(2) {
        storage.add_dependency(&pair[0], &pair[1]).unwrap();
    }

    let upstream = storage.get_dependency_tree(&ids[0]).unwrap();
    assert_eq!(upstream.len(), 50);
    assert_eq!(upstream.iter().map(|n| n.depth).max(), Some(50));
    assert!(upstream.iter().all(|n| n.direction == TreeDirection::Upstream));
    assert!(!upstream.iter().any(|n| n.id == ids[51]));
}

#[test]
fn tree_depth_follows_options() {
    let options = StorageOptions {
        max_tree_depth: 2,
        ..StorageOptions::default()
    };
    let mut storage = SqliteStorage::open_memory_with_options(options).unwrap();
    for id in ["A", "B", "C", "D"] {
        create(&mut storage, id);
    }
    storage.add_dependency("A", "B").unwrap();
    storage.add_dependency("B", "C").unwrap();
    storage.add_dependency("C", "D").unwrap();

    let nodes = storage.get_dependency_tree("A").unwrap();
    let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["B", "C"]);
}

#[test]
fn add_dependency_is_idempotent() {
    let mut storage = test_db();
    create(&mut storage, "A");
    create(&mut storage, "B");

    assert!(storage.add_dependency("A", "B").unwrap());
    assert!(!storage.add_dependency("A", "B").unwrap());
    assert_eq!(storage.get_dependencies("A").unwrap().len(), 1);
    assert_eq!(storage.get_dependents("B").unwrap()[0].child_id, "A");
}

#[test]
fn add_dependency_rejects_bad_edges() {
    let mut storage = test_db();
    create(&mut storage, "A");

    assert!(matches!(
        storage.add_dependency("A", "A"),
        Err(StoreError::Validation { .. })
    ));
    assert!(matches!(
        storage.add_dependency("A", "ghost"),
        Err(StoreError::TaskNotFound { .. })
    ));
}

#[test]
fn remove_dependency_reports_whether_edge_existed() {
    let mut storage = test_db();
    for id in ["A", "B", "C"] {
        create(&mut storage, id);
    }
    storage.add_dependency("A", "B").unwrap();
    storage.add_dependency("A", "C").unwrap();

    assert!(storage.remove_dependency("A", "B").unwrap());
    assert!(!storage.remove_dependency("A", "B").unwrap());
    assert_eq!(storage.remove_dependencies("A").unwrap(), 1);
    assert!(storage.get_dependencies("A").unwrap().is_empty());
}

#[test]
fn batch_dependency_lookup_spans_chunks() {
    let mut storage = test_db();
    create(&mut storage, "root");
    let children: Vec<String> = (0..620).map(|i| format!("child-{i:03}")).collect();
    for id in &children {
        TaskBuilder::new(id)
            .with_id(id)
            .blocked_by("root")
            .create(&mut storage);
    }

    let mut query = children.clone();
    query.push("no-edges".to_string());
    let map = storage.get_dependencies_for_tasks(&query).unwrap();

    assert_eq!(map.len(), children.len());
    assert!(!map.contains_key("no-edges"));
    assert!(map.values().all(|deps| deps.len() == 1 && deps[0].parent_id == "root"));
}
