//! Transaction core: project, draft, run, finalize, write back.
//!
//! Both entry points take ownership of a state the caller has already
//! cloned for exclusive use; the authoritative state is never touched here.

use crate::state::draft::{Draft, SharedDraft};
use crate::state::projection::{project, write_back, ProjectionSpec};
use serde_json::Value;
use std::future::Future;

/// Run a synchronous body against the projection of `state`.
///
/// Returns the state with the finalized draft written back, plus the
/// body's own return value. A failing body produces no state.
pub fn run<R, E, F>(mut state: Value, spec: &ProjectionSpec, body: F) -> Result<(Value, R), E>
where
    F: FnOnce(&mut Draft) -> Result<R, E>,
{
    let mut draft = Draft::new(project(&state, spec));
    let result = body(&mut draft)?;

    let view = draft.finalize();
    write_back(spec, &view, &mut state);

    Ok((state, result))
}

/// Asynchronous counterpart of [`run`]. The draft is finalized only after
/// the body's future completes.
pub async fn run_async<R, E, F, Fut>(
    mut state: Value,
    spec: &ProjectionSpec,
    body: F,
) -> Result<(Value, R), E>
where
    F: FnOnce(SharedDraft) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let draft = SharedDraft::new(Draft::new(project(&state, spec)));
    let result = body(draft.clone()).await?;

    let view = draft.take().finalize();
    write_back(spec, &view, &mut state);

    Ok((state, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use serde_json::json;

    #[test]
    fn test_run_commits_draft() {
        let state = json!({"a": {"b": 5}});
        let spec = ProjectionSpec::parse([("f", "a.b")]).unwrap();

        let (next, result) = run(state, &spec, |draft| {
            draft.set("f", json!(10));
            Ok::<_, StoreError>(())
        })
        .unwrap();

        assert_eq!(next, json!({"a": {"b": 10}}));
        assert_eq!(result, ());
    }

    #[test]
    fn test_run_returns_body_result() {
        let state = json!({"field": 5});
        let spec = ProjectionSpec::parse([("test", "field")]).unwrap();

        let (next, result) = run(state.clone(), &spec, |draft| {
            Ok::<_, StoreError>(draft.get("test").cloned())
        })
        .unwrap();

        assert_eq!(result, Some(json!(5)));
        assert_eq!(next, state);
    }

    #[test]
    fn test_run_propagates_body_error() {
        #[derive(Debug, PartialEq)]
        struct Boom;

        let spec = ProjectionSpec::parse([("test", "field")]).unwrap();
        let outcome = run(json!({"field": 5}), &spec, |draft| {
            draft.set("test", json!(6));
            Err::<(), _>(Boom)
        });

        assert_eq!(outcome, Err(Boom));
    }

    #[test]
    fn test_run_sets_array_members() {
        let state = json!({"field3": {"test": "t", "test2": [{"n": 1}, {}, null]}});
        let spec = ProjectionSpec::parse([
            ("test", "field3.test2.0"),
            ("test2", "field3.test2.1"),
            ("test3", "field3.test2.2"),
        ])
        .unwrap();

        let (next, _) = run(state, &spec, |draft| {
            draft.set("test", json!({"n": 2}));
            draft.set("test2", json!({"n": 3}));
            draft.set("test3", json!({"n": 4}));
            Ok::<_, StoreError>(())
        })
        .unwrap();

        assert_eq!(
            next,
            json!({"field3": {"test": "t", "test2": [{"n": 2}, {"n": 3}, {"n": 4}]}})
        );
    }

    #[tokio::test]
    async fn test_run_async_awaits_body() {
        let spec = ProjectionSpec::parse([("count", "counter")]).unwrap();

        let (next, result) = run_async(json!({"counter": 1}), &spec, |draft| async move {
            tokio::task::yield_now().await;
            draft.update("count", |v| *v = json!(v.as_i64().unwrap_or(0) + 1));
            Ok::<_, StoreError>("done")
        })
        .await
        .unwrap();

        assert_eq!(next, json!({"counter": 2}));
        assert_eq!(result, "done");
    }
}
