//! Integration tests for `pm`.

use pm::config::Config;
use pm::tasks::{
    AddOutcome, DependencyStore, MetadataStore, MetadataValue, NewTask, NoteEntity, NoteStore,
    Project, RemoveOutcome, SqliteTaskStore, SubtaskStore, Task, TaskStatus, TaskStore,
    TaskUpdate,
};
use pm::{ErrorKind, VERSION};
use std::sync::{Arc, Barrier};
use tempfile::TempDir;

fn setup() -> (TempDir, SqliteTaskStore, Project) {
    let dir = TempDir::new().unwrap();
    let store = SqliteTaskStore::new(dir.path().join("pm.db")).unwrap();
    let project = store.create_project("Roadmap", None, None).unwrap();
    (dir, store, project)
}

fn task(store: &SqliteTaskStore, project: &Project, name: &str) -> Task {
    store
        .create_task(NewTask {
            project_id: project.id.clone(),
            name: name.to_string(),
            description: None,
            status: None,
        })
        .unwrap()
}

fn set_status(store: &SqliteTaskStore, id: &str, status: TaskStatus) -> pm::Result<Task> {
    store.update_task(id, TaskUpdate { status: Some(status), ..TaskUpdate::default() })
}

#[test]
fn test_version_exists() {
    assert!(!VERSION.is_empty());
}

#[test]
fn test_cycle_is_rejected_then_allowed_after_remove() {
    let (_dir, store, project) = setup();
    let t1 = task(&store, &project, "T1");
    let t2 = task(&store, &project, "T2");
    let t3 = task(&store, &project, "T3");

    assert_eq!(store.add_dependency(&t2.id, &t1.id).unwrap(), AddOutcome::Added);
    assert_eq!(store.add_dependency(&t3.id, &t2.id).unwrap(), AddOutcome::Added);

    let err = store.add_dependency(&t1.id, &t3.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);
    let expected = format!("{} -> {} -> {} -> {}", t1.id, t3.id, t2.id, t1.id);
    assert!(err.to_string().ends_with(&expected), "{err}");
    assert_eq!(store.list_edges().unwrap().len(), 2);

    let prerequisites = store.list_prerequisites(&t3.id).unwrap();
    let ids: Vec<&str> = prerequisites.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec![t2.id.as_str()]);

    assert_eq!(store.remove_dependency(&t2.id, &t1.id).unwrap(), RemoveOutcome::Removed);
    assert_eq!(store.add_dependency(&t1.id, &t3.id).unwrap(), AddOutcome::Added);
    assert!(!store.dependency_graph().unwrap().has_cycle());
}

#[test]
fn test_two_store_handles_share_one_graph() {
    let (dir, store, project) = setup();
    let a = task(&store, &project, "a");
    let b = task(&store, &project, "b");

    let other = SqliteTaskStore::new(dir.path().join("pm.db")).unwrap();
    other.add_dependency(&a.id, &b.id).unwrap();

    let err = store.add_dependency(&b.id, &a.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);
}

#[test]
fn test_concurrent_opposite_adds_leave_graph_acyclic() {
    let (dir, store, project) = setup();
    let a = task(&store, &project, "a");
    let b = task(&store, &project, "b");
    let db_path = dir.path().join("pm.db");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [(a.id.clone(), b.id.clone()), (b.id.clone(), a.id.clone())]
        .into_iter()
        .map(|(from, to)| {
            let barrier = Arc::clone(&barrier);
            let db_path = db_path.clone();
            std::thread::spawn(move || {
                let store = SqliteTaskStore::new(&db_path).unwrap();
                barrier.wait();
                store.add_dependency(&from, &to)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);
    assert_eq!(store.list_edges().unwrap().len(), 1);
}

#[test]
fn test_deleting_a_task_cleans_up_everything_attached() {
    let (_dir, store, project) = setup();
    let design = task(&store, &project, "design");
    let build = task(&store, &project, "build");
    let ship = task(&store, &project, "ship");

    store.add_dependency(&build.id, &design.id).unwrap();
    store.add_dependency(&ship.id, &build.id).unwrap();
    store.create_subtask(&build.id, "compile", None, true).unwrap();
    store.set_metadata(&build.id, "estimate", MetadataValue::Int(3)).unwrap();
    let note = store.add_note(NoteEntity::Task, &build.id, "halfway", None).unwrap();

    store.delete_task(&build.id).unwrap();

    assert!(store.list_edges().unwrap().is_empty());
    assert!(store.list_dependents(&design.id).unwrap().is_empty());
    assert_eq!(store.list_prerequisites(&ship.id).unwrap().len(), 0);
    assert!(store.query_tasks_by_metadata("estimate", "3").unwrap().is_empty());
    assert_eq!(store.get_note(note.id).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_completion_follows_prerequisites_and_subtasks() {
    let (_dir, store, project) = setup();
    let design = task(&store, &project, "design");
    let build = task(&store, &project, "build");
    store.add_dependency(&build.id, &design.id).unwrap();

    let err = set_status(&store, &build.id, TaskStatus::InProgress).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    // An abandoned prerequisite no longer blocks.
    set_status(&store, &design.id, TaskStatus::Abandoned).unwrap();
    set_status(&store, &build.id, TaskStatus::InProgress).unwrap();

    let check = store.create_subtask(&build.id, "review", None, true).unwrap();
    let err = set_status(&store, &build.id, TaskStatus::Completed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    store
        .update_subtask(
            &check.id,
            pm::tasks::SubtaskUpdate { status: Some(TaskStatus::Completed), ..Default::default() },
        )
        .unwrap();
    let done = set_status(&store, &build.id, TaskStatus::Completed).unwrap();
    assert!(done.is_closed());
}

#[test]
fn test_config_can_forbid_cross_project_dependencies() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".pm")).unwrap();
    std::fs::write(
        dir.path().join(".pm/config.yaml"),
        "allow_cross_project_dependencies: false\nbusy_timeout_ms: 1000\n",
    )
    .unwrap();

    let config = Config::resolve_with(dir.path(), None).unwrap();
    let store = SqliteTaskStore::in_pm_dir(dir.path(), config.store_options()).unwrap();
    let web = store.create_project("Web", None, None).unwrap();
    let api = store.create_project("Api", None, None).unwrap();
    let page = task(&store, &web, "page");
    let endpoint = task(&store, &api, "endpoint");
    let other_page = task(&store, &web, "other page");

    let err = store.add_dependency(&page.id, &endpoint.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    store.add_dependency(&page.id, &other_page.id).unwrap();
    assert!(dir.path().join(".pm/pm.db").exists());
}
