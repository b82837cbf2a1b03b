//! Integration tests for request dispatch, callbacks and cancellation,
//! against a local axum server bound to an ephemeral port.

use axum::extract::RawQuery;
use axum::routing::{get, post};
use axum::Router;
use quickfetch_net::{
    FetchError, HttpService, Lifecycle, LifecycleHandle, Outcome, ServiceConfig,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn service(base: &str) -> HttpService {
    HttpService::new(ServiceConfig::new().base_url(base)).expect("service")
}

#[tokio::test]
async fn test_get_query_contains_every_param_once() {
    let app = Router::new().route(
        "/echo",
        get(|RawQuery(query): RawQuery| async move { query.unwrap_or_default() }),
    );
    let base = spawn_server(app).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    service(&base)
        .request("/echo")
        .add_param("a", 1)
        .add_param("b", 2)
        .fetch_text(move |outcome| {
            let _ = tx.send(match outcome {
                Outcome::Success(body) => body,
                other => panic!("unexpected outcome: {:?}", other),
            });
        });

    let query = recv(&mut rx).await;
    assert_eq!(query, "a=1&b=2");
    assert_eq!(query.matches("a=").count(), 1);
    assert!(!query.ends_with('&'));
}

#[tokio::test]
async fn test_fetch_json_decodes_typed_body() {
    #[derive(Debug, Deserialize)]
    struct Book {
        title: String,
        pages: u32,
    }

    let app = Router::new().route(
        "/book",
        get(|| async { r#"{"title":"Dune","pages":412}"# }),
    );
    let base = spawn_server(app).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    service(&base).request("/book").fetch_json::<Book, _>(move |outcome| {
        match outcome {
            Outcome::Success(book) => {
                assert_eq!(book.title, "Dune");
                assert_eq!(book.pages, 412);
                let _ = tx.send("decoded".to_string());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    });
    assert_eq!(recv(&mut rx).await, "decoded");
}

#[tokio::test]
async fn test_decode_failure_is_a_parse_outcome() {
    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Book {
        title: String,
    }

    let app = Router::new().route("/bad", get(|| async { "this is not json" }));
    let base = spawn_server(app).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    service(&base).request("/bad").fetch_json::<Book, _>(move |outcome| {
        match outcome {
            Outcome::Parse { body, .. } => {
                assert_eq!(body, "this is not json");
                let _ = tx.send("parse".to_string());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    });
    assert_eq!(recv(&mut rx).await, "parse");
}

#[tokio::test]
async fn test_connect_failure_is_classified() {
    let config = ServiceConfig::new()
        .retry_on_connection_failure(false)
        .connect_timeout(Duration::from_secs(2));
    let svc = HttpService::new(config).expect("service");

    let (tx, mut rx) = mpsc::unbounded_channel();
    // Port 1 is never listening locally.
    svc.request("http://127.0.0.1:1/").fetch_text(move |outcome| {
        match outcome {
            Outcome::Failure { error, is_connect } => {
                assert!(is_connect, "expected connect classification: {}", error);
                assert!(error.is_network());
                let _ = tx.send("failed".to_string());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    });
    assert_eq!(recv(&mut rx).await, "failed");
}

#[tokio::test]
async fn test_post_sends_form_body() {
    let app = Router::new().route("/submit", post(|body: String| async move { body }));
    let base = spawn_server(app).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    service(&base)
        .request("/submit")
        .post()
        .add_param("name", "alex")
        .fetch_text(move |outcome| {
            if let Outcome::Success(body) = outcome {
                let _ = tx.send(body);
            }
        });
    assert_eq!(recv(&mut rx).await, "name=alex");
}

#[tokio::test]
async fn test_lifecycle_order_started_outcome_ended() {
    let app = Router::new().route("/ok", get(|| async { "ok" }));
    let base = spawn_server(app).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let lifecycle_tx = tx.clone();
    service(&base)
        .request("/ok")
        .on_lifecycle(move |event| {
            let _ = lifecycle_tx.send(format!("{:?}", event));
        })
        .fetch_text(move |_| {
            let _ = tx.send("outcome".to_string());
        });

    assert_eq!(recv(&mut rx).await, format!("{:?}", Lifecycle::Started));
    assert_eq!(recv(&mut rx).await, "outcome");
    assert_eq!(recv(&mut rx).await, format!("{:?}", Lifecycle::Ended));
}

#[tokio::test]
async fn test_duplicate_body_suppression_fires_only_ended() {
    let app = Router::new().route("/feed", get(|| async { r#"{"items":[]}"# }));
    let base = spawn_server(app).await;
    let svc = service(&base);

    let run = |svc: HttpService| {
        let (tx, rx) = mpsc::unbounded_channel();
        let lifecycle_tx = tx.clone();
        svc.request("/feed")
            .ignore_duplicate_body(true)
            .on_lifecycle(move |event| {
                let _ = lifecycle_tx.send(format!("{:?}", event));
            })
            .fetch_text(move |_| {
                let _ = tx.send("outcome".to_string());
            });
        rx
    };

    let mut rx = run(svc.clone());
    assert_eq!(recv(&mut rx).await, "Started");
    assert_eq!(recv(&mut rx).await, "outcome");
    assert_eq!(recv(&mut rx).await, "Ended");

    // Identical body for the same URL: success is skipped, only Ended fires.
    let mut rx = run(svc.clone());
    assert_eq!(recv(&mut rx).await, "Started");
    assert_eq!(recv(&mut rx).await, "Ended");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_dead_binder_drops_callbacks_but_clears_registry() {
    let app = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            "late"
        }),
    );
    let base = spawn_server(app).await;
    let svc = service(&base);

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_cb = Arc::clone(&fired);
    let owner = LifecycleHandle::new("MainScreen");
    svc.request("/slow")
        .binder(owner.clone())
        .fetch_text(move |_| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        });
    assert_eq!(svc.registry().len(), 1);

    owner.retire();
    let registry_svc = svc.clone();
    wait_until(move || registry_svc.registry().is_empty()).await;

    // Give a stray callback a chance to land before asserting silence.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_all_empties_registry_and_reports_cancelled() {
    let app = Router::new().route(
        "/hang",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "never"
        }),
    );
    let base = spawn_server(app).await;
    let svc = service(&base);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx2 = tx.clone();
    let first = svc
        .request("/hang")
        .add_param("id", 1)
        .fetch_text(move |outcome| {
            if let Outcome::Failure { error, .. } = outcome {
                let _ = tx.send(format!("{}", error));
            }
        });
    let second = svc
        .request("/hang")
        .add_param("id", 2)
        .fetch_text(move |outcome| {
            if let Outcome::Failure { error, .. } = outcome {
                let _ = tx2.send(format!("{}", error));
            }
        });
    assert_eq!(svc.registry().len(), 2);

    svc.cancel_all();
    assert!(svc.registry().is_empty());
    assert!(first.is_cancelled());
    assert!(second.is_cancelled());

    let cancelled = FetchError::Cancelled.to_string();
    assert_eq!(recv(&mut rx).await, cancelled);
    assert_eq!(recv(&mut rx).await, cancelled);
}

#[tokio::test]
async fn test_cancel_by_tag_cancels_one_task() {
    let app = Router::new().route(
        "/hang",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "never"
        }),
    );
    let base = spawn_server(app).await;
    let svc = service(&base);

    let tagged = svc
        .request("/hang")
        .tag("stop-me")
        .fetch_text(|_| {});
    let untagged = svc.request("/hang").add_param("other", 1).fetch_text(|_| {});

    assert!(svc.cancel_by_tag("stop-me"));
    assert!(tagged.is_cancelled());
    assert!(!untagged.is_cancelled());
    assert!(!svc.cancel_by_tag("stop-me"));
    svc.cancel_all();
}

#[tokio::test]
async fn test_cancel_by_owner_cancels_scoped_tasks() {
    let app = Router::new().route(
        "/hang",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "never"
        }),
    );
    let base = spawn_server(app).await;
    let svc = service(&base);

    let screen = LifecycleHandle::new("ListScreen");
    let mine = svc
        .request("/hang")
        .binder(screen.clone())
        .fetch_text(|_| {});
    let other = svc.request("/hang").add_param("x", 9).fetch_text(|_| {});

    svc.cancel_by_owner(&screen);
    assert!(mine.is_cancelled());
    assert!(!other.is_cancelled());
    svc.cancel_all();
}

#[tokio::test]
async fn test_oversized_body_becomes_placeholder() {
    let app = Router::new().route("/huge", get(|| async { "x".repeat(4096) }));
    let base = spawn_server(app).await;
    let config = ServiceConfig::new().base_url(&base).max_body_bytes(1024);
    let svc = HttpService::new(config).expect("service");

    let (tx, mut rx) = mpsc::unbounded_channel();
    svc.request("/huge").fetch_text(move |outcome| {
        if let Outcome::Success(body) = outcome {
            let _ = tx.send(body);
        }
    });
    let body = recv(&mut rx).await;
    assert!(body.contains("too large"), "got: {}", body);
}

#[tokio::test]
async fn test_global_hooks_observe_responses_and_failures() {
    let app = Router::new().route("/ok", get(|| async { "observed" }));
    let base = spawn_server(app).await;

    let raw_bodies = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(AtomicUsize::new(0));
    let raw_clone = Arc::clone(&raw_bodies);
    let failures_clone = Arc::clone(&failures);

    let config = ServiceConfig::new()
        .base_url(&base)
        .retry_on_connection_failure(false)
        .on_response(move |body| {
            raw_clone.lock().unwrap().push(body.to_string());
        })
        .on_failure(move |_, _| {
            failures_clone.fetch_add(1, Ordering::SeqCst);
        });
    let svc = HttpService::new(config).expect("service");

    let (tx, mut rx) = mpsc::unbounded_channel();
    svc.request("/ok").fetch_text(move |_| {
        let _ = tx.send("done".to_string());
    });
    recv(&mut rx).await;
    assert_eq!(raw_bodies.lock().unwrap().as_slice(), ["observed"]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    svc.request("http://127.0.0.1:1/").fetch_text(move |_| {
        let _ = tx.send("failed".to_string());
    });
    recv(&mut rx).await;
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_before_request_hook_runs_against_every_builder() {
    let app = Router::new().route(
        "/echo",
        get(|RawQuery(query): RawQuery| async move { query.unwrap_or_default() }),
    );
    let base = spawn_server(app).await;

    let config = ServiceConfig::new()
        .base_url(&base)
        .on_before_request(|builder| {
            builder.insert_param("injected", "yes");
        });
    let svc = HttpService::new(config).expect("service");

    let (tx, mut rx) = mpsc::unbounded_channel();
    svc.request("/echo").add_param("own", "1").fetch_text(move |outcome| {
        if let Outcome::Success(body) = outcome {
            let _ = tx.send(body);
        }
    });
    let query = recv(&mut rx).await;
    assert!(query.contains("injected=yes"));
    assert!(query.contains("own=1"));
}
