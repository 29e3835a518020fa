//! End-to-end pipeline behavior: stage ordering, capture boundaries, skips,
//! layered metadata, and the driver's delivery contract.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use parking_lot::Mutex;
use trellis_core::{Code, NamedKey, Reply, Response};
use trellis_pipeline::{
    options, App, BoxFuture, Controller, Guard, LayerId, Outcome, Raise, RequestState, Route,
};

type Events = Arc<Mutex<Vec<&'static str>>>;
type Delivered = Arc<Mutex<Vec<Reply>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn capture_finalizer(sink: Delivered) -> options::Configure {
    options::finalizer(move |_state, reply| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().push(reply);
            Ok(())
        })
    })
}

fn tracing_middleware(
    events: Events,
    before: &'static str,
    after: &'static str,
) -> options::Configure {
    options::middleware_fn(move |state, next| {
        let events = Arc::clone(&events);
        Box::pin(async move {
            events.lock().push(before);
            next.run(state).await;
            events.lock().push(after);
            Ok(())
        })
    })
}

fn tracing_interceptor(
    events: Events,
    before: &'static str,
    after: &'static str,
) -> options::Configure {
    options::interceptor_fn(move |state, next| {
        let events = Arc::clone(&events);
        Box::pin(async move {
            events.lock().push(before);
            next.run(state).await;
            events.lock().push(after);
            Ok(())
        })
    })
}

fn tracing_guard(events: Events, tag: &'static str) -> options::Configure {
    options::guard_fn(move |_state| {
        let events = Arc::clone(&events);
        Box::pin(async move {
            events.lock().push(tag);
            Ok(())
        })
    })
}

fn ok_handler(events: Events, tag: &'static str) -> options::Configure {
    options::handle(move |_state| {
        let events = Arc::clone(&events);
        Box::pin(async move {
            events.lock().push(tag);
            Err(Response::ok("done").into())
        })
    })
}

#[tokio::test]
async fn test_stage_ordering_with_unconditional_after_logic() {
    init_tracing();
    let events: Events = Arc::default();
    let delivered: Delivered = Arc::default();

    let mut app = App::new([
        capture_finalizer(Arc::clone(&delivered)),
        tracing_middleware(Arc::clone(&events), "app.before", "app.after"),
    ]);
    let controller = Controller::new("orders", [
        tracing_middleware(Arc::clone(&events), "ctrl.before", "ctrl.after"),
        tracing_guard(Arc::clone(&events), "guard"),
        tracing_interceptor(Arc::clone(&events), "icpt.before", "icpt.after"),
    ])
    .route("create", {
        let events = Arc::clone(&events);
        move || Route::post("/orders", [ok_handler(events, "handler")])
    });
    app.add_controller(controller).unwrap();
    app.build().unwrap();

    let endpoint = Arc::clone(app.endpoint(&Method::POST, "/orders").unwrap());
    endpoint.dispatch().await.unwrap();

    assert_eq!(
        *events.lock(),
        vec![
            "app.before",
            "ctrl.before",
            "guard",
            "icpt.before",
            "handler",
            "icpt.after",
            "ctrl.after",
            "app.after",
        ]
    );
    let replies = delivered.lock();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].code(), Some(Code::Ok));
}

#[tokio::test]
async fn test_guard_denial_skips_inner_stages_but_not_after_logic() {
    let events: Events = Arc::default();
    let delivered: Delivered = Arc::default();

    let mut app = App::new([
        capture_finalizer(Arc::clone(&delivered)),
        tracing_middleware(Arc::clone(&events), "mw.before", "mw.after"),
        options::guard_fn(|_state| {
            Box::pin(async { Err(Response::failure(Code::PermissionDenied).into()) })
        }),
        tracing_guard(Arc::clone(&events), "second.guard"),
        tracing_interceptor(Arc::clone(&events), "icpt.before", "icpt.after"),
    ]);
    app.add_route(Route::get("/secret", [ok_handler(Arc::clone(&events), "handler")]))
        .unwrap();
    app.build().unwrap();

    let endpoint = Arc::clone(app.endpoint(&Method::GET, "/secret").unwrap());
    endpoint.dispatch().await.unwrap();

    // The denial settles at the guard stage: the guard after the denying one,
    // the interceptor, and the handler never run; the middleware's after-logic
    // still does.
    assert_eq!(*events.lock(), vec!["mw.before", "mw.after"]);
    assert_eq!(delivered.lock()[0].code(), Some(Code::PermissionDenied));
}

#[tokio::test]
async fn test_middleware_can_short_circuit_by_not_calling_next() {
    let events: Events = Arc::default();
    let delivered: Delivered = Arc::default();

    let mut app = App::new([
        capture_finalizer(Arc::clone(&delivered)),
        options::middleware_fn(|state, _next| {
            Box::pin(async move {
                state.set_reply(Response::failure(Code::Unavailable));
                Ok(())
            })
        }),
    ]);
    app.add_route(Route::get("/work", [ok_handler(Arc::clone(&events), "handler")]))
        .unwrap();
    app.build().unwrap();

    let endpoint = Arc::clone(app.endpoint(&Method::GET, "/work").unwrap());
    endpoint.dispatch().await.unwrap();

    assert!(events.lock().is_empty(), "handler must not run");
    assert_eq!(delivered.lock()[0].code(), Some(Code::Unavailable));
}

#[tokio::test]
async fn test_skip_by_identity_drops_only_the_named_layer() {
    let events: Events = Arc::default();
    let delivered: Delivered = Arc::default();

    let audit = LayerId::new("audit");
    let audited_middleware = {
        let events = Arc::clone(&events);
        trellis_pipeline::MiddlewareFn::with_id(audit, move |state, next| {
            let events = Arc::clone(&events);
            Box::pin(async move {
                events.lock().push("audit");
                next.run(state).await;
                Ok(())
            })
        })
    };

    let controller = Controller::new("files", [
        options::middleware(audited_middleware),
        tracing_middleware(Arc::clone(&events), "anon.before", "anon.after"),
    ])
    .route("read", {
        let events = Arc::clone(&events);
        move || Route::get("/read", [ok_handler(events, "read")])
    })
    .route("stream", {
        let events = Arc::clone(&events);
        move || Route::get("/stream", [options::skip([audit]), ok_handler(events, "stream")])
    });

    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_controller(controller).unwrap();
    app.build().unwrap();

    let read = Arc::clone(app.endpoint(&Method::GET, "/read").unwrap());
    let stream = Arc::clone(app.endpoint(&Method::GET, "/stream").unwrap());

    // Filtering happened at build time: the audited middleware still runs on
    // the sibling route, and the anonymous middleware runs on both.
    read.dispatch().await.unwrap();
    stream.dispatch().await.unwrap();

    assert_eq!(
        *events.lock(),
        vec![
            "audit", "anon.before", "read", "anon.after",
            "anon.before", "stream", "anon.after",
        ]
    );
    assert_eq!(delivered.lock().len(), 2);
}

#[tokio::test]
async fn test_skip_all_guards_admits_everything() {
    let delivered: Delivered = Arc::default();
    let events: Events = Arc::default();

    let deny_all = || {
        options::guard_fn(|_state| {
            Box::pin(async { Err(Response::failure(Code::PermissionDenied).into()) })
        })
    };

    let mut app = App::new([capture_finalizer(Arc::clone(&delivered)), deny_all()]);
    app.add_route(Route::get("/open", [
        options::skip_all_guards(),
        ok_handler(Arc::clone(&events), "open"),
    ]))
    .unwrap();
    app.add_route(Route::get("/closed", [ok_handler(Arc::clone(&events), "closed")]))
        .unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/open").unwrap())
        .dispatch()
        .await
        .unwrap();
    Arc::clone(app.endpoint(&Method::GET, "/closed").unwrap())
        .dispatch()
        .await
        .unwrap();

    assert_eq!(*events.lock(), vec!["open"]);
    let replies = delivered.lock();
    assert_eq!(replies[0].code(), Some(Code::Ok));
    assert_eq!(replies[1].code(), Some(Code::PermissionDenied));
}

#[tokio::test]
async fn test_narrower_skip_declaration_shadows_wider_one() {
    let events: Events = Arc::default();
    let delivered: Delivered = Arc::default();

    let audit = LayerId::new("audit");
    let audit_guard = move || {
        trellis_pipeline::GuardFn::with_id(audit, |_state| {
            Box::pin(async { Err(Response::failure(Code::FailedPrecondition).into()) })
        })
    };

    let controller = Controller::new("jobs", [
        options::guard(audit_guard()),
        // The controller opts out of the audit guard for all of its routes...
        options::skip([audit]),
    ])
    .route("fast", {
        let events = Arc::clone(&events);
        move || Route::get("/fast", [ok_handler(events, "fast")])
    })
    .route("slow", {
        let events = Arc::clone(&events);
        // ...but this route's own declaration shadows the controller's
        // entirely, bringing the audit guard back.
        move || Route::get("/slow", [options::skip([LayerId::new("unrelated")]),
            ok_handler(events, "slow")])
    });

    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_controller(controller).unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/fast").unwrap())
        .dispatch()
        .await
        .unwrap();
    Arc::clone(app.endpoint(&Method::GET, "/slow").unwrap())
        .dispatch()
        .await
        .unwrap();

    assert_eq!(*events.lock(), vec!["fast"]);
    let replies = delivered.lock();
    assert_eq!(replies[0].code(), Some(Code::Ok));
    assert_eq!(replies[1].code(), Some(Code::FailedPrecondition));
}

#[tokio::test]
async fn test_metadata_resolves_most_specific_scope() {
    let delivered: Delivered = Arc::default();

    let controller = Controller::new("billing", [
        options::prefix("/billing"),
        options::metadata(NamedKey::new("timeout_ms"), 500_u64),
    ])
    .route("charge", || {
        Route::post("/charge", [
            options::metadata(NamedKey::new("timeout_ms"), 2_000_u64),
            options::handle(|_state| Box::pin(async { Err(Response::empty().into()) })),
        ])
    })
    .route("refund", || {
        Route::post("/refund", [options::handle(|_state| {
            Box::pin(async { Err(Response::empty().into()) })
        })])
    });

    let mut app = App::new([
        capture_finalizer(Arc::clone(&delivered)),
        options::metadata(NamedKey::new("timeout_ms"), 100_u64),
        options::metadata(NamedKey::new("owner"), "platform".to_string()),
    ]);
    app.add_controller(controller).unwrap();
    app.build().unwrap();

    let charge = app.endpoint(&Method::POST, "/billing/charge").unwrap();
    let refund = app.endpoint(&Method::POST, "/billing/refund").unwrap();

    assert_eq!(
        charge.metadata().get::<u64>(&NamedKey::new("timeout_ms")).as_deref(),
        Some(&2_000)
    );
    assert_eq!(
        refund.metadata().get::<u64>(&NamedKey::new("timeout_ms")).as_deref(),
        Some(&500)
    );
    // Root-only entries stay visible everywhere.
    assert_eq!(
        charge.metadata().get::<String>(&NamedKey::new("owner")).as_deref(),
        Some(&"platform".to_string())
    );
}

#[tokio::test]
async fn test_pre_execute_hooks_run_first_and_ignore_skips() {
    let events: Events = Arc::default();
    let delivered: Delivered = Arc::default();

    let hook = |events: Events, tag: &'static str| {
        options::pre_execute(move |_state| {
            let events = Arc::clone(&events);
            Box::pin(async move {
                events.lock().push(tag);
            })
        })
    };

    let mut app = App::new([
        capture_finalizer(Arc::clone(&delivered)),
        hook(Arc::clone(&events), "pre.app"),
        tracing_middleware(Arc::clone(&events), "mw.before", "mw.after"),
    ]);
    app.add_route(Route::get("/run", [
        hook(Arc::clone(&events), "pre.route"),
        options::skip_all_guards(),
        ok_handler(Arc::clone(&events), "handler"),
    ]))
    .unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/run").unwrap())
        .dispatch()
        .await
        .unwrap();

    assert_eq!(
        *events.lock(),
        vec!["pre.app", "pre.route", "mw.before", "handler", "mw.after"]
    );
}

#[tokio::test]
async fn test_unrecognized_raised_value_is_retained() {
    #[derive(Debug, PartialEq)]
    struct AbortToken(u32);

    let delivered: Delivered = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_route(Route::get("/odd", [options::handle(|_state| {
        Box::pin(async { Err(Raise::value(AbortToken(7))) })
    })]))
    .unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/odd").unwrap())
        .dispatch()
        .await
        .unwrap();

    let replies = delivered.lock();
    assert_eq!(replies[0].code(), Some(Code::Unknown));
    assert_eq!(
        replies[0].raised_value::<AbortToken>().as_deref(),
        Some(&AbortToken(7))
    );
}

#[tokio::test]
async fn test_raised_errors_unwrap_embedded_responses() {
    let delivered: Delivered = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_route(Route::get("/embedded", [options::handle(|_state| {
        Box::pin(async {
            let err = anyhow::Error::new(Response::failure(Code::NotFound));
            Err(Raise::from(err))
        })
    })]))
    .unwrap();
    app.add_route(Route::get("/plain", [options::handle(|_state| {
        Box::pin(async { Err(Raise::from(anyhow::anyhow!("backend melted"))) })
    })]))
    .unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/embedded").unwrap())
        .dispatch()
        .await
        .unwrap();
    Arc::clone(app.endpoint(&Method::GET, "/plain").unwrap())
        .dispatch()
        .await
        .unwrap();

    let replies = delivered.lock();
    assert_eq!(replies[0].code(), Some(Code::NotFound));
    let plain = replies[1].as_structured().unwrap();
    assert_eq!(plain.code(), Code::Unknown);
    assert_eq!(plain.message(), Some("backend melted"));
}

#[tokio::test]
async fn test_value_transform_override_is_scoped() {
    let delivered: Delivered = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_route(Route::get("/mapped", [
        options::value_transform(|_state, raise| match raise {
            Raise::Reply(reply) => reply,
            Raise::Error(_) | Raise::Value(_) => {
                Response::failure(Code::Aborted).into()
            }
        }),
        options::handle(|_state| Box::pin(async { Err(Raise::value("anything")) })),
    ]))
    .unwrap();
    app.add_route(Route::get("/default", [options::handle(|_state| {
        Box::pin(async { Err(Raise::value("anything")) })
    })]))
    .unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/mapped").unwrap())
        .dispatch()
        .await
        .unwrap();
    Arc::clone(app.endpoint(&Method::GET, "/default").unwrap())
        .dispatch()
        .await
        .unwrap();

    let replies = delivered.lock();
    assert_eq!(replies[0].code(), Some(Code::Aborted));
    assert_eq!(replies[1].code(), Some(Code::Unknown));
}

/// A windowed counter guard: at most `limit` admissions per rolling window.
struct RateLimitGuard {
    limit: usize,
    window: Duration,
    hits: Mutex<Vec<Instant>>,
}

impl RateLimitGuard {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(Vec::new()),
        }
    }
}

impl Guard for RateLimitGuard {
    fn id(&self) -> Option<LayerId> {
        Some(LayerId::of::<Self>())
    }

    fn allow<'a>(&'a self, _state: &'a RequestState) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let now = Instant::now();
            let mut hits = self.hits.lock();
            hits.retain(|hit| now.duration_since(*hit) < self.window);
            if hits.len() >= self.limit {
                return Err(Response::failure(Code::TooManyRequests)
                    .with(|r| r.add_meta("limit", self.limit))
                    .into());
            }
            hits.push(now);
            Ok(())
        })
    }
}

#[tokio::test]
async fn test_rate_limit_guard_denies_past_the_window_limit() {
    let delivered: Delivered = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_route(Route::get("/limited", [
        options::guard(RateLimitGuard::new(3, Duration::from_secs(10))),
        options::handle(|_state| Box::pin(async { Err(Response::empty().into()) })),
    ]))
    .unwrap();
    app.build().unwrap();

    let endpoint = Arc::clone(app.endpoint(&Method::GET, "/limited").unwrap());
    for _ in 0..4 {
        endpoint.dispatch().await.unwrap();
    }

    let replies = delivered.lock();
    let codes: Vec<_> = replies.iter().map(Reply::code).collect();
    assert_eq!(
        codes,
        vec![
            Some(Code::Ok),
            Some(Code::Ok),
            Some(Code::Ok),
            Some(Code::TooManyRequests),
        ]
    );
    assert!(Code::TooManyRequests.is_retryable());
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn test_guard_stage_log_only_appears_when_guards_exist() {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(buffer.clone())
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let delivered: Delivered = Arc::default();
    let events: Events = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_route(Route::get("/bare", [ok_handler(Arc::clone(&events), "bare")]))
        .unwrap();
    app.add_route(Route::get("/guarded", [
        options::guard_fn(|_state| Box::pin(async { Ok(()) })),
        ok_handler(Arc::clone(&events), "guarded"),
    ]))
    .unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/bare").unwrap())
        .dispatch()
        .await
        .unwrap();
    assert!(
        !buffer.contents().contains("guard_evaluating"),
        "no guard stage line for a guardless endpoint"
    );

    Arc::clone(app.endpoint(&Method::GET, "/guarded").unwrap())
        .dispatch()
        .await
        .unwrap();
    assert!(buffer.contents().contains("guard_evaluating"));
}

#[tokio::test]
async fn test_raw_reply_bypasses_serialization() {
    let delivered: Delivered = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_route(Route::get("/ping", [options::handle(|_state| {
        Box::pin(async {
            Err(trellis_core::RawReply::new(http::StatusCode::OK, &b"pong"[..]).into())
        })
    })]))
    .unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/ping").unwrap())
        .dispatch()
        .await
        .unwrap();

    let replies = delivered.lock();
    let raw = replies[0].as_raw().expect("raw reply");
    assert_eq!(raw.status().as_u16(), 200);
    assert_eq!(raw.body().as_ref(), b"pong");
    assert!(replies[0].code().is_none());
}

#[tokio::test]
async fn test_empty_response_slot_yields_fallback_fault() {
    let delivered: Delivered = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    // The handler completes without raising or setting a reply.
    app.add_route(Route::get("/silent", [options::handle(|_state| {
        Box::pin(async { Ok(()) })
    })]))
    .unwrap();
    app.build().unwrap();

    Arc::clone(app.endpoint(&Method::GET, "/silent").unwrap())
        .dispatch()
        .await
        .unwrap();

    let replies = delivered.lock();
    let response = replies[0].as_structured().unwrap();
    assert_eq!(response.code(), Code::Unknown);
    assert_eq!(response.message(), Some("no response produced"));
}

#[tokio::test]
async fn test_finalizer_failure_is_a_dispatch_error() {
    let mut app = App::new([options::finalizer(|_state, _reply| {
        Box::pin(async { Err(anyhow::anyhow!("socket closed")) })
    })]);
    app.add_route(Route::get("/flaky", [options::handle(|_state| {
        Box::pin(async { Err(Response::empty().into()) })
    })]))
    .unwrap();
    app.build().unwrap();

    let endpoint = Arc::clone(app.endpoint(&Method::GET, "/flaky").unwrap());
    let err = endpoint.dispatch().await.unwrap_err();
    assert!(err.to_string().contains("GET /flaky"));
}

#[tokio::test]
async fn test_storage_is_cleared_and_endpoint_bound_on_external_state() {
    let delivered: Delivered = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_route(Route::get("/stateful", [options::handle(|state| {
        Box::pin(async move {
            state.store(41_u64);
            let resident = state.load::<u64>().map_err(anyhow::Error::new)?;
            Err(Response::ok(*resident + 1).into())
        })
    })]))
    .unwrap();
    app.build().unwrap();

    let endpoint = Arc::clone(app.endpoint(&Method::GET, "/stateful").unwrap());
    let state = RequestState::new();
    endpoint.dispatch_on(&state).await.unwrap();

    assert_eq!(state.endpoint().unwrap().name(), "GET /stateful");
    assert!(state.storage().is_empty(), "storage is cleared on exit");
    let replies = delivered.lock();
    assert_eq!(
        replies[0].as_structured().unwrap().data(),
        Some(&serde_json::json!(42))
    );
}

#[tokio::test]
async fn test_concurrent_dispatches_do_not_share_state() {
    let delivered: Delivered = Arc::default();
    let mut app = App::new([capture_finalizer(Arc::clone(&delivered))]);
    app.add_route(Route::get("/iso", [options::handle(|state| {
        Box::pin(async move {
            let (resident, existed) = state.load_or_store(1_u32).map_err(anyhow::Error::new)?;
            // A fresh storage per dispatch means the slot is never resident.
            if existed {
                return Err(Raise::from(anyhow::anyhow!("state leaked across requests")));
            }
            Err(Response::ok(*resident).into())
        })
    })]))
    .unwrap();
    app.build().unwrap();

    let endpoint = Arc::clone(app.endpoint(&Method::GET, "/iso").unwrap());
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move { endpoint.dispatch().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let replies = delivered.lock();
    assert_eq!(replies.len(), 16);
    assert!(replies.iter().all(|reply| reply.code() == Some(Code::Ok)));
}
