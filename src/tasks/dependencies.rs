//! Task dependencies.
//!
//! Every read and write of the `task_dependencies` table goes through
//! [`DependencyStore`]. Adding an edge checks, in order: both identifiers
//! are well formed, both tasks exist, the edge is not a self-loop, the
//! project policy allows it, and the graph stays acyclic. All of that and the insert happen in a single
//! `BEGIN IMMEDIATE` transaction, so two processes adding opposite edges
//! cannot both succeed.

use crate::error::{Entity, Error, Result};
use crate::tasks::graph::DependencyGraph;
use crate::tasks::id::validate_identifier;
use crate::tasks::models::{AddOutcome, DependencyEdge, RemoveOutcome, Task};
use crate::tasks::store::{
    audit_json, log_audit, now, parse_task, require_task, task_exists, SqliteTaskStore,
    TASK_COLUMNS,
};
use rusqlite::{params, Connection};

/// Trait for dependency edge operations.
#[allow(clippy::missing_errors_doc)]
pub trait DependencyStore {
    /// Record that `task_id` depends on `depends_on`.
    ///
    /// Re-adding an existing edge succeeds with [`AddOutcome::AlreadyPresent`].
    fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<AddOutcome>;

    /// Remove an edge. A missing edge is reported, not an error.
    fn remove_dependency(&self, task_id: &str, depends_on: &str) -> Result<RemoveOutcome>;

    /// Direct prerequisites of a task, ordered by task ID.
    fn list_prerequisites(&self, task_id: &str) -> Result<Vec<Task>>;

    /// Tasks that directly depend on a task, ordered by task ID.
    fn list_dependents(&self, task_id: &str) -> Result<Vec<Task>>;

    /// Direct prerequisites that are neither completed nor abandoned.
    fn incomplete_prerequisites(&self, task_id: &str) -> Result<Vec<Task>>;

    /// Every stored edge, ordered by dependent then prerequisite.
    fn list_edges(&self) -> Result<Vec<DependencyEdge>>;

    /// The whole edge set as a graph.
    fn dependency_graph(&self) -> Result<DependencyGraph>;
}

/// Load the full edge set.
pub(crate) fn load_graph(conn: &Connection) -> Result<DependencyGraph> {
    let mut stmt = conn.prepare("SELECT task_id, depends_on FROM task_dependencies")?;
    let edges = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(DependencyGraph::from_edges(edges))
}

/// Open prerequisites of `task_id` on an existing connection.
pub(crate) fn incomplete_prerequisites_on(conn: &Connection, task_id: &str) -> Result<Vec<Task>> {
    query_tasks(
        conn,
        &format!(
            "SELECT {TASK_COLUMNS} FROM task_dependencies d
             JOIN tasks t ON t.id = d.depends_on
             WHERE d.task_id = ?1 AND t.status NOT IN ('COMPLETED', 'ABANDONED')
             ORDER BY t.id"
        ),
        task_id,
    )
}

fn query_tasks(conn: &Connection, sql: &str, task_id: &str) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let tasks = stmt
        .query_map(params![task_id], parse_task)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

impl SqliteTaskStore {
    /// Run a read-only query about `task_id`, failing if the task does not exist.
    fn task_query(&self, sql: &str, task_id: &str) -> Result<Vec<Task>> {
        let conn = self.open()?;
        if !task_exists(&conn, task_id)? {
            return Err(Error::not_found(Entity::Task, task_id));
        }
        query_tasks(&conn, sql, task_id)
    }
}

impl DependencyStore for SqliteTaskStore {
    fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<AddOutcome> {
        validate_identifier(task_id)?;
        validate_identifier(depends_on)?;
        let allow_cross_project = self.options().allow_cross_project_dependencies;

        self.write(|conn| {
            let task = require_task(conn, task_id)?;
            let prerequisite = require_task(conn, depends_on)?;

            if task_id == depends_on {
                return Err(Error::InvalidArgument(format!("task {task_id} cannot depend on itself")));
            }

            if !allow_cross_project && task.project_id != prerequisite.project_id {
                return Err(Error::InvalidArgument(format!(
                    "task {task_id} (project {}) cannot depend on task {depends_on} (project {}): \
                     cross-project dependencies are disabled",
                    task.project_id, prerequisite.project_id
                )));
            }

            let graph = load_graph(conn)?;
            if graph.would_create_cycle(task_id, depends_on) {
                let path = graph
                    .find_path(depends_on, task_id)
                    .unwrap_or_else(|| vec![depends_on.to_string(), task_id.to_string()]);
                return Err(Error::CycleDetected {
                    task_id: task_id.to_string(),
                    depends_on: depends_on.to_string(),
                    path,
                });
            }

            let inserted = conn.execute(
                "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on, created_at)
                 VALUES (?1, ?2, ?3)",
                params![task_id, depends_on, now()],
            )?;

            if inserted == 0 {
                return Ok(AddOutcome::AlreadyPresent);
            }

            let edge = serde_json::json!({ "task_id": task_id, "depends_on": depends_on });
            log_audit(conn, "add_dependency", Some(task_id), None, audit_json(&edge).as_deref(), None)?;
            Ok(AddOutcome::Added)
        })
    }

    fn remove_dependency(&self, task_id: &str, depends_on: &str) -> Result<RemoveOutcome> {
        validate_identifier(task_id)?;
        validate_identifier(depends_on)?;
        self.write(|conn| {
            let removed = conn.execute(
                "DELETE FROM task_dependencies WHERE task_id = ?1 AND depends_on = ?2",
                params![task_id, depends_on],
            )?;

            if removed == 0 {
                return Ok(RemoveOutcome::NotFound);
            }

            let edge = serde_json::json!({ "task_id": task_id, "depends_on": depends_on });
            log_audit(
                conn,
                "remove_dependency",
                Some(task_id),
                audit_json(&edge).as_deref(),
                None,
                None,
            )?;
            Ok(RemoveOutcome::Removed)
        })
    }

    fn list_prerequisites(&self, task_id: &str) -> Result<Vec<Task>> {
        self.task_query(
            &format!(
                "SELECT {TASK_COLUMNS} FROM task_dependencies d
                 JOIN tasks t ON t.id = d.depends_on
                 WHERE d.task_id = ?1
                 ORDER BY t.id"
            ),
            task_id,
        )
    }

    fn list_dependents(&self, task_id: &str) -> Result<Vec<Task>> {
        self.task_query(
            &format!(
                "SELECT {TASK_COLUMNS} FROM task_dependencies d
                 JOIN tasks t ON t.id = d.task_id
                 WHERE d.depends_on = ?1
                 ORDER BY t.id"
            ),
            task_id,
        )
    }

    fn incomplete_prerequisites(&self, task_id: &str) -> Result<Vec<Task>> {
        let conn = self.open()?;
        if !task_exists(&conn, task_id)? {
            return Err(Error::not_found(Entity::Task, task_id));
        }
        incomplete_prerequisites_on(&conn, task_id)
    }

    fn list_edges(&self) -> Result<Vec<DependencyEdge>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, depends_on, created_at FROM task_dependencies
             ORDER BY task_id, depends_on",
        )?;
        let edges = stmt
            .query_map([], |row| {
                Ok(DependencyEdge {
                    task_id: row.get(0)?,
                    depends_on: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn dependency_graph(&self) -> Result<DependencyGraph> {
        let conn = self.open()?;
        load_graph(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tasks::models::{Project, TaskStatus};
    use crate::tasks::store::{NewTask, StoreOptions, TaskStore, TaskUpdate};
    use proptest::prelude::*;
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteTaskStore, Project) {
        let dir = TempDir::new().unwrap();
        let store = SqliteTaskStore::new(dir.path().join("test.db")).unwrap();
        let project = store.create_project("Test", None, None).unwrap();
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

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_three_task_scenario() {
        let (_dir, store, project) = create_test_store();
        let t1 = task(&store, &project, "T1");
        let t2 = task(&store, &project, "T2");
        let t3 = task(&store, &project, "T3");

        assert_eq!(store.add_dependency(&t2.id, &t1.id).unwrap(), AddOutcome::Added);
        assert_eq!(store.add_dependency(&t3.id, &t2.id).unwrap(), AddOutcome::Added);
        assert_eq!(store.list_edges().unwrap().len(), 2);

        let err = store.add_dependency(&t1.id, &t3.id).unwrap_err();
        match &err {
            Error::CycleDetected { task_id, depends_on, path } => {
                assert_eq!(task_id, &t1.id);
                assert_eq!(depends_on, &t3.id);
                assert_eq!(path, &vec![t3.id.clone(), t2.id.clone(), t1.id.clone()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert_eq!(store.list_edges().unwrap().len(), 2);

        assert_eq!(ids(&store.list_prerequisites(&t3.id).unwrap()), vec![t2.id.as_str()]);

        assert_eq!(store.remove_dependency(&t2.id, &t1.id).unwrap(), RemoveOutcome::Removed);
        assert_eq!(store.add_dependency(&t1.id, &t3.id).unwrap(), AddOutcome::Added);
    }

    #[test]
    fn test_two_node_cycle_rejected() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");
        let b = task(&store, &project, "b");

        store.add_dependency(&a.id, &b.id).unwrap();
        let err = store.add_dependency(&b.id, &a.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
    }

    #[test]
    fn test_three_node_cycle_rejected() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");
        let b = task(&store, &project, "b");
        let c = task(&store, &project, "c");

        store.add_dependency(&a.id, &b.id).unwrap();
        store.add_dependency(&b.id, &c.id).unwrap();
        let err = store.add_dependency(&c.id, &a.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
        assert!(err.to_string().contains(&format!("{} -> {}", c.id, a.id)));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");

        let err = store.add_dependency(&a.id, &a.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(store.list_edges().unwrap().is_empty());
    }

    #[test]
    fn test_missing_tasks_are_not_found() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");

        let err = store.add_dependency(&a.id, "ghost-0000").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store.add_dependency("ghost-0000", &a.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store.list_prerequisites("ghost-0000").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_malformed_identifiers_are_invalid_arguments() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");

        for (from, to) in [("bad id!", a.id.as_str()), (a.id.as_str(), ""), ("-x", "y")] {
            let err = store.add_dependency(from, to).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{from} -> {to}");
        }
        let err = store.remove_dependency(&a.id, "bad id!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(store.list_edges().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");
        let b = task(&store, &project, "b");

        assert_eq!(store.add_dependency(&a.id, &b.id).unwrap(), AddOutcome::Added);
        assert_eq!(store.add_dependency(&a.id, &b.id).unwrap(), AddOutcome::AlreadyPresent);
        assert_eq!(store.list_edges().unwrap().len(), 1);

        let audit = store.get_audit_log(Some(&a.id), None).unwrap();
        let adds = audit.iter().filter(|e| e.operation == "add_dependency").count();
        assert_eq!(adds, 1);
    }

    #[test]
    fn test_remove_missing_edge_reports_not_found() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");
        let b = task(&store, &project, "b");

        assert_eq!(store.remove_dependency(&a.id, &b.id).unwrap(), RemoveOutcome::NotFound);
        assert_eq!(store.remove_dependency("x", "y").unwrap(), RemoveOutcome::NotFound);
    }

    #[test]
    fn test_list_prerequisites_ordered_by_id() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");
        let c = task(&store, &project, "c");
        let b = task(&store, &project, "b");

        store.add_dependency(&a.id, &c.id).unwrap();
        store.add_dependency(&a.id, &b.id).unwrap();

        let mut expected = vec![b.id.as_str(), c.id.as_str()];
        expected.sort_unstable();
        assert_eq!(ids(&store.list_prerequisites(&a.id).unwrap()), expected);
        assert!(store.list_prerequisites(&b.id).unwrap().is_empty());
    }

    #[test]
    fn test_list_dependents() {
        let (_dir, store, project) = create_test_store();
        let base = task(&store, &project, "base");
        let x = task(&store, &project, "x");
        let y = task(&store, &project, "y");

        store.add_dependency(&x.id, &base.id).unwrap();
        store.add_dependency(&y.id, &base.id).unwrap();

        let mut expected = vec![x.id.as_str(), y.id.as_str()];
        expected.sort_unstable();
        assert_eq!(ids(&store.list_dependents(&base.id).unwrap()), expected);
    }

    #[test]
    fn test_deleting_task_removes_its_edges() {
        let (_dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");
        let b = task(&store, &project, "b");
        let c = task(&store, &project, "c");

        store.add_dependency(&a.id, &b.id).unwrap();
        store.add_dependency(&b.id, &c.id).unwrap();
        store.add_dependency(&a.id, &c.id).unwrap();

        store.delete_task(&b.id).unwrap();

        let edges = store.list_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].task_id.as_str(), edges[0].depends_on.as_str()), (a.id.as_str(), c.id.as_str()));
    }

    #[test]
    fn test_incomplete_prerequisites_gate_start_and_completion() {
        let (_dir, store, project) = create_test_store();
        let design = task(&store, &project, "design");
        let build = task(&store, &project, "build");
        let spike = task(&store, &project, "spike");
        store.add_dependency(&build.id, &design.id).unwrap();
        store.add_dependency(&build.id, &spike.id).unwrap();

        let set = |id: &str, status| {
            store.update_task(id, TaskUpdate { status: Some(status), ..Default::default() })
        };

        assert_eq!(store.incomplete_prerequisites(&build.id).unwrap().len(), 2);
        let err = set(&build.id, TaskStatus::InProgress).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        set(&design.id, TaskStatus::InProgress).unwrap();
        set(&design.id, TaskStatus::Completed).unwrap();
        set(&spike.id, TaskStatus::Abandoned).unwrap();

        assert!(store.incomplete_prerequisites(&build.id).unwrap().is_empty());
        set(&build.id, TaskStatus::InProgress).unwrap();
        set(&build.id, TaskStatus::Completed).unwrap();
    }

    #[test]
    fn test_cross_project_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let open = SqliteTaskStore::new(&path).unwrap();
        let p1 = open.create_project("One", None, None).unwrap();
        let p2 = open.create_project("Two", None, None).unwrap();
        let a = task(&open, &p1, "a");
        let b = task(&open, &p2, "b");
        let c = task(&open, &p1, "c");

        let strict = SqliteTaskStore::with_options(
            &path,
            StoreOptions { allow_cross_project_dependencies: false, ..StoreOptions::default() },
        )
        .unwrap();
        let err = strict.add_dependency(&a.id, &b.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(strict.add_dependency(&a.id, &c.id).unwrap(), AddOutcome::Added);

        // Moving a task with a dependency out of its project would cross projects.
        let err = strict
            .update_task(&c.id, TaskUpdate { project_id: Some(p2.id.clone()), ..Default::default() })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(open.add_dependency(&a.id, &b.id).unwrap(), AddOutcome::Added);
    }

    #[test]
    fn test_concurrent_opposite_adds_only_one_succeeds() {
        let (dir, store, project) = create_test_store();
        let a = task(&store, &project, "a");
        let b = task(&store, &project, "b");
        let path = dir.path().join("test.db");

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [(a.id.clone(), b.id.clone()), (b.id.clone(), a.id.clone())]
            .into_iter()
            .map(|(from, to)| {
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = SqliteTaskStore::new(&path).unwrap();
                    barrier.wait();
                    store.add_dependency(&from, &to)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1, "{results:?}");
        let failed = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(failed.kind(), ErrorKind::CycleDetected);
        assert_eq!(store.list_edges().unwrap().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn stored_edges_stay_acyclic(
            ops in prop::collection::vec((any::<bool>(), 0usize..6, 0usize..6), 1..30)
        ) {
            let (_dir, store, project) = create_test_store();
            let tasks: Vec<Task> =
                (0..6).map(|i| task(&store, &project, &format!("t{i}"))).collect();

            for (add, x, y) in ops {
                let (from, to) = (&tasks[x].id, &tasks[y].id);
                if add {
                    match store.add_dependency(from, to) {
                        Ok(_) => {}
                        Err(e) => prop_assert!(matches!(
                            e.kind(),
                            ErrorKind::CycleDetected | ErrorKind::InvalidArgument
                        )),
                    }
                } else {
                    store.remove_dependency(from, to).unwrap();
                }
                prop_assert!(!store.dependency_graph().unwrap().has_cycle());
            }
        }
    }
}
