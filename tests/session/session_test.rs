// tests/session/session_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::{Arc, Mutex};

use common::{club, members_of_club, Call, Club, ScriptedExecutor, CLUB};
use quarry::cache;
use quarry::config::ExecutionSettings;
use quarry::prelude::*;

fn stale() -> DriverError {
    DriverError::new(8144, "procedure has too many arguments specified")
}

fn executed(calls: &[Call]) -> Vec<Option<u64>> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Execute { transaction, .. } => Some(*transaction),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_insert_many_commits_local_transaction() {
    let session = Session::new(ScriptedExecutor::new());
    let affected = session
        .insert_many(&[club(0, "Lions"), club(0, "Tigers")], None)
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let calls = session.executor().calls();
    assert_eq!(calls.first(), Some(&Call::Begin(1)));
    assert_eq!(calls.last(), Some(&Call::Commit(1)));
    assert_eq!(executed(&calls), vec![Some(1), Some(1)]);
}

#[tokio::test]
async fn test_insert_many_rolls_back_on_failure() {
    let executor = ScriptedExecutor::new().script(vec![None, Some(DriverError::new(2627, "duplicate key"))]);
    let session = Session::new(executor);
    let err = session
        .insert_many(&[club(0, "Lions"), club(0, "Tigers"), club(0, "Bears")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Driver(ref e) if e.code == 2627));
    assert_eq!(err.category(), quarry::ErrorCategory::Execution);

    let calls = session.executor().calls();
    assert_eq!(executed(&calls).len(), 2);
    assert_eq!(calls.last(), Some(&Call::Rollback(1)));
    assert!(!calls.contains(&Call::Commit(1)));
}

#[tokio::test]
async fn test_caller_transaction_is_never_finished() {
    let session = Session::new(ScriptedExecutor::new());
    let tx = Transaction::new(42);
    session
        .insert_many(&[club(0, "Lions"), club(0, "Tigers")], Some(&tx))
        .await
        .unwrap();
    session
        .bulk_insert(&[club(0, "Bears")], Some(&tx))
        .await
        .unwrap();

    let calls = session.executor().calls();
    assert_eq!(executed(&calls), vec![Some(42), Some(42), Some(42)]);
    assert!(calls
        .iter()
        .all(|c| matches!(c, Call::Execute { .. })));
}

#[tokio::test]
async fn test_empty_insert_many_opens_nothing() {
    let session = Session::new(ScriptedExecutor::new());
    assert_eq!(session.insert_many::<Club>(&[], None).await.unwrap(), 0);
    assert!(session.executor().calls().is_empty());
}

#[tokio::test]
async fn test_stale_plan_retries_once() {
    let executor = ScriptedExecutor::new().script(vec![Some(stale())]);
    let session = Session::new(executor);
    let affected = session
        .delete(&CLUB, &field("Id").eq(3), None)
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(executed(&session.executor().calls()).len(), 2);
}

#[tokio::test]
async fn test_stale_plan_gives_up_after_one_retry() {
    let executor = ScriptedExecutor::new().script(vec![Some(stale()), Some(stale())]);
    let session = Session::new(executor);
    let err = session
        .delete(&CLUB, &field("Id").eq(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Driver(ref e) if e.code == 8144));
    assert_eq!(executed(&session.executor().calls()).len(), 2);
}

#[tokio::test]
async fn test_other_errors_are_not_retried() {
    let executor = ScriptedExecutor::new().script(vec![Some(DriverError::new(547, "constraint"))]);
    let session = Session::new(executor).with_execution(ExecutionSettings {
        stale_plan_codes: vec![2801],
    });
    assert!(session
        .delete(&CLUB, &field("Id").eq(3), None)
        .await
        .is_err());
    assert_eq!(executed(&session.executor().calls()).len(), 1);
}

#[tokio::test]
async fn test_observer_sees_every_driver_error() {
    let seen: Arc<Mutex<Vec<(i32, String, usize)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let executor = ScriptedExecutor::new().script(vec![Some(stale()), Some(DriverError::new(547, "constraint"))]);
    let session = Session::new(executor).on_driver_error(move |err, sql, params| {
        sink.lock()
            .unwrap()
            .push((err.code, sql.to_string(), params.len()));
    });

    let err = session
        .update(&CLUB, &Row::new().with("Name", "Lions"), &field("Id").eq(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Driver(ref e) if e.code == 547));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, 8144);
    assert_eq!(seen[1].0, 547);
    assert_eq!(seen[0].1, "UPDATE [Club] SET [Name] = @Name WHERE [Id] = @Id");
    assert_eq!(seen[0].2, 2);
}

#[tokio::test]
async fn test_shape_errors_raise_before_io() {
    let session = Session::new(ScriptedExecutor::new());
    let err = session
        .query::<Club>(&QueryShape::of::<Club>().select(Selector::new()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::EmptySelector));
    assert!(session.executor().calls().is_empty());
}

#[tokio::test]
async fn test_joined_query_materializes_graph() {
    let row = |club: i64, member: i64| {
        Row::new()
            .with("Id", club)
            .with("Name", "Lions")
            .with("IsActive", true)
            .with("Id", member)
            .with("ClubId", club)
            .with("Name", format!("member {member}"))
    };
    let executor = ScriptedExecutor::new().returning(vec![row(1, 10), row(1, 11)]);
    let session = Session::new(executor);

    let clubs: Vec<Club> = session
        .query(&QueryShape::of::<Club>().join(members_of_club()), None)
        .await
        .unwrap();
    assert_eq!(clubs.len(), 1);
    let names: Vec<_> = clubs[0].members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["member 10", "member 11"]);

    // Setters are rebuilt from the join descriptors after a purge.
    cache::purge();
    let again: Vec<Club> = session
        .query(&QueryShape::of::<Club>().join(members_of_club()), None)
        .await
        .unwrap();
    assert_eq!(again[0].members.len(), 2);
}

#[tokio::test]
async fn test_first_limits_single_table_queries() {
    let executor = ScriptedExecutor::new().returning(vec![Row::new().with("Id", 4).with("Name", "Lions")]);
    let session = Session::new(executor);
    let first: Option<Club> = session
        .first(
            &QueryShape::of::<Club>().select(Selector::new().item(field("Id")).item(field("Name"))),
            None,
        )
        .await
        .unwrap();
    assert_eq!(first.map(|c| c.id), Some(4));
    assert_eq!(
        session.executor().calls(),
        vec![Call::Query {
            sql: "SELECT TOP(1) clb1.[Id], clb1.[Name] FROM [Club] clb1".to_string(),
            transaction: None
        }]
    );
}

#[tokio::test]
async fn test_insert_output_reads_back_row() {
    let executor = ScriptedExecutor::new().returning(vec![Row::new()
        .with("Id", 0)
        .with("Name", "Lions")
        .with("IsActive", true)]);
    let session = Session::new(executor);
    let inserted = session
        .insert_output(&club(0, "Lions"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inserted.name, "Lions");
    assert!(matches!(
        session.executor().calls().as_slice(),
        [Call::Query { sql, transaction: None }] if sql.contains("OUTPUT")
    ));
}

#[tokio::test]
async fn test_session_from_settings() {
    let settings = Settings::from_toml(
        r#"
[connections.main]
connection_string = "Server=tcp:db01,1433;Database=Sales"

[generator]
dirty_read = true

[execution]
stale_plan_codes = [999]
"#,
    )
    .unwrap();
    let executor = ScriptedExecutor::new().script(vec![Some(DriverError::new(999, "stale"))]);
    let session = Session::from_settings(executor, &settings).unwrap();
    session
        .delete(&CLUB, &field("Id").eq(1), None)
        .await
        .unwrap();
    assert_eq!(executed(&session.executor().calls()).len(), 2);
    assert!(session.generator().settings().dirty_read);
}
