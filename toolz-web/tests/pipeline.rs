use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use toolz_config::ProxySpec;
use toolz_http::{HttpClient, HttpError};
use toolz_web::detect::Detector;
use toolz_web::hydrate::{
    HydrationPolicy, HydrationRenderer, RenderError, RenderSurface, SurfaceFactory, SurfaceSnapshot,
};
use toolz_web::proxy::{FetchError, ProxyFetcher};
use toolz_web::{PagePipeline, PipelineError};
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TARGET: &str = "https://acme.test/app";

// ------------------------------
// Fake rendering surface
// ------------------------------

#[derive(Default)]
struct SurfaceLog {
    opened: AtomicUsize,
    probes: AtomicUsize,
    torn_down: AtomicUsize,
    documents: Mutex<Vec<String>>,
}

/// Replays `script` one probe at a time, repeating the last entry.
/// `None` entries make that probe fail.
struct FakeFactory {
    script: Vec<Option<SurfaceSnapshot>>,
    log: Arc<SurfaceLog>,
    fail_open: bool,
    fail_source: bool,
    fail_teardown: bool,
}

impl FakeFactory {
    fn new(script: Vec<Option<SurfaceSnapshot>>) -> Self {
        Self {
            script,
            log: Arc::new(SurfaceLog::default()),
            fail_open: false,
            fail_source: false,
            fail_teardown: false,
        }
    }
}

struct FakeSurface {
    script: Vec<Option<SurfaceSnapshot>>,
    log: Arc<SurfaceLog>,
    fail_source: bool,
    fail_teardown: bool,
}

#[async_trait]
impl SurfaceFactory for FakeFactory {
    async fn open(&self, document: &str) -> anyhow::Result<Box<dyn RenderSurface>> {
        if self.fail_open {
            return Err(anyhow!("webdriver unavailable"));
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        self.log.documents.lock().unwrap().push(document.to_string());
        Ok(Box::new(FakeSurface {
            script: self.script.clone(),
            log: self.log.clone(),
            fail_source: self.fail_source,
            fail_teardown: self.fail_teardown,
        }))
    }
}

#[async_trait]
impl RenderSurface for FakeSurface {
    async fn probe(&mut self, _root_id: &str) -> anyhow::Result<SurfaceSnapshot> {
        let n = self.log.probes.fetch_add(1, Ordering::SeqCst);
        let idx = n.min(self.script.len() - 1);
        self.script[idx].clone().ok_or_else(|| anyhow!("script error"))
    }

    async fn source(&mut self) -> anyhow::Result<String> {
        if self.fail_source {
            return Err(anyhow!("no such window"));
        }
        Ok("<html><body><div id=\"root\"><h1>Rendered</h1></div></body></html>".into())
    }

    async fn teardown(self: Box<Self>) -> anyhow::Result<()> {
        self.log.torn_down.fetch_add(1, Ordering::SeqCst);
        if self.fail_teardown {
            return Err(anyhow!("session already gone"));
        }
        Ok(())
    }
}

fn shell() -> Option<SurfaceSnapshot> {
    Some(SurfaceSnapshot {
        text: "Loading...".into(),
        root_children: 0,
    })
}

fn hydrated() -> Option<SurfaceSnapshot> {
    Some(SurfaceSnapshot {
        text: "Acme rockets ship in a day".into(),
        root_children: 2,
    })
}

// ------------------------------
// Helpers
// ------------------------------

fn relay(server: &MockServer, name: &str) -> ProxySpec {
    ProxySpec {
        name: name.into(),
        base: format!("{}/{name}?url=", server.uri()),
        headers: BTreeMap::new(),
    }
}

fn pipeline(relays: &[ProxySpec], factory: Option<Arc<FakeFactory>>) -> PagePipeline {
    let fetcher = ProxyFetcher::new(HttpClient::absolute().unwrap(), relays).unwrap();
    let renderer = factory.map(|f| HydrationRenderer::new(f, HydrationPolicy::default()));
    PagePipeline::new(fetcher, Detector::default(), renderer)
}

async fn mount_relay(server: &MockServer, name: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/{name}")))
        .and(query_param("url", TARGET))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

const STATIC_PAGE: &str = r#"<html><head>
<title>Acme</title>
<meta name="description" content="A simple site">
</head><body><h1>Hello</h1><p>We build rockets.</p></body></html>"#;

const NEXT_PAGE: &str = r#"<html><head><title>Acme App</title></head><body>
<div id="app"></div>
<script id="data" type="application/json">{"props":{}}</script>
<script>window.__NEXT_DATA__ = {"page":"/"}</script>
</body></html>"#;

// ------------------------------
// Fetcher
// ------------------------------

#[tokio::test]
async fn every_relay_failing_is_proxy_exhausted_and_nothing_renders() {
    let server = MockServer::start().await;
    mount_relay(&server, "first", ResponseTemplate::new(500), 1).await;
    mount_relay(&server, "second", ResponseTemplate::new(404), 1).await;

    let factory = Arc::new(FakeFactory::new(vec![hydrated()]));
    let p = pipeline(
        &[relay(&server, "first"), relay(&server, "second")],
        Some(factory.clone()),
    );

    let err = p.run(TARGET).await.unwrap_err();
    match &err {
        PipelineError::Fetch(FetchError::ProxyExhausted { attempted, last }) => {
            assert_eq!(*attempted, 2);
            assert!(matches!(last, HttpError::Api { status, .. } if status.as_u16() == 404));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message(), "unable to fetch the page");
    assert_eq!(factory.log.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn first_relay_success_short_circuits() {
    let server = MockServer::start().await;
    mount_relay(
        &server,
        "first",
        ResponseTemplate::new(200).set_body_json(json!({ "contents": STATIC_PAGE, "status": { "http_code": 200 } })),
        1,
    )
    .await;
    mount_relay(&server, "second", ResponseTemplate::new(200).set_body_string(STATIC_PAGE), 0).await;

    let p = pipeline(&[relay(&server, "first"), relay(&server, "second")], None);
    let result = p.run(TARGET).await.unwrap();
    assert_eq!(result.proxy, "first");
}

#[tokio::test]
async fn failing_relay_falls_through_to_raw_body() {
    let server = MockServer::start().await;
    mount_relay(&server, "first", ResponseTemplate::new(502), 1).await;
    mount_relay(&server, "second", ResponseTemplate::new(200).set_body_string(STATIC_PAGE), 1).await;

    let p = pipeline(&[relay(&server, "first"), relay(&server, "second")], None);
    let result = p.run(TARGET).await.unwrap();
    assert_eq!(result.proxy, "second");
    assert_eq!(result.html_content, STATIC_PAGE);
}

/// Nothing listens on port 1, so the connection is refused.
fn dead_relay(name: &str) -> ProxySpec {
    ProxySpec {
        name: name.into(),
        base: "http://127.0.0.1:1/get?url=".into(),
        headers: BTreeMap::new(),
    }
}

#[tokio::test]
async fn unreachable_relay_falls_through_to_the_next() {
    let server = MockServer::start().await;
    mount_relay(&server, "second", ResponseTemplate::new(200).set_body_string(STATIC_PAGE), 1).await;

    let p = pipeline(&[dead_relay("first"), relay(&server, "second")], None);
    let result = p.run(TARGET).await.unwrap();
    assert_eq!(result.proxy, "second");
    assert_eq!(result.metadata.title, "Acme");
}

#[tokio::test]
async fn only_unreachable_relays_report_the_network_error() {
    let p = pipeline(&[dead_relay("first"), dead_relay("second")], None);
    let err = p.run(TARGET).await.unwrap_err();
    match err {
        PipelineError::Fetch(FetchError::ProxyExhausted { attempted, last }) => {
            assert_eq!(attempted, 2);
            assert!(matches!(last, HttpError::Network(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_url_fails_before_any_request() {
    let server = MockServer::start().await;
    mount_relay(&server, "first", ResponseTemplate::new(200), 0).await;

    let p = pipeline(&[relay(&server, "first")], None);
    let err = p.run("not a url").await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidUrl { .. }));
}

// ------------------------------
// End to end
// ------------------------------

#[tokio::test]
async fn static_page_skips_the_renderer() {
    let server = MockServer::start().await;
    mount_relay(
        &server,
        "first",
        ResponseTemplate::new(200).set_body_json(json!({ "contents": STATIC_PAGE })),
        1,
    )
    .await;

    let factory = Arc::new(FakeFactory::new(vec![hydrated()]));
    let p = pipeline(&[relay(&server, "first")], Some(factory.clone()));
    let result = p.run(TARGET).await.unwrap();

    assert!(!result.metadata.is_react_app);
    assert_eq!(result.metadata.title, "Acme");
    assert_eq!(result.metadata.description, "A simple site");
    assert_eq!(result.metadata.og_image, "");
    assert_eq!(result.text_content, "Hello\nWe build rockets.");
    assert_eq!(result.rendered_content, result.text_content);
    assert_eq!(result.html_content, STATIC_PAGE);
    assert!(result.hydration.is_none());
    assert_eq!(factory.log.opened.load(Ordering::SeqCst), 0);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["metadata"]["isReactApp"], false);
    assert_eq!(json["detection"]["clientRendered"], false);
    assert_eq!(json["detection"]["signals"], json!([]));
    assert_eq!(json["textContent"], "Hello\nWe build rockets.");
    assert!(json.get("hydration").is_none());
}

#[tokio::test]
async fn next_data_marker_triggers_rendering() {
    let server = MockServer::start().await;
    mount_relay(
        &server,
        "first",
        ResponseTemplate::new(200).set_body_json(json!({ "body": NEXT_PAGE })),
        1,
    )
    .await;

    let factory = Arc::new(FakeFactory::new(vec![hydrated()]));
    let p = pipeline(&[relay(&server, "first")], Some(factory.clone()));
    let result = p.run(TARGET).await.unwrap();

    assert!(result.metadata.is_react_app);
    assert_eq!(result.rendered_content, "Acme rockets ship in a day");
    assert!(result.html_content.contains("<h1>Rendered</h1>"));
    let report = result.hydration.expect("hydration report");
    assert!(report.ready);
    assert_eq!(report.attempts, 1);

    assert_eq!(factory.log.opened.load(Ordering::SeqCst), 1);
    assert_eq!(factory.log.torn_down.load(Ordering::SeqCst), 1);
    let documents = factory.log.documents.lock().unwrap();
    assert!(documents[0].contains(r#"<base href="https://acme.test/app">"#));
    assert!(documents[0].contains(r#"name="viewport""#));
}

#[tokio::test]
async fn disabled_rendering_reports_static_text_for_client_pages() {
    let server = MockServer::start().await;
    mount_relay(&server, "first", ResponseTemplate::new(200).set_body_string(NEXT_PAGE), 1).await;

    let factory = Arc::new(FakeFactory::new(vec![hydrated()]));
    let p = pipeline(&[relay(&server, "first")], Some(factory.clone())).without_rendering();
    let result = p.run(TARGET).await.unwrap();

    assert!(result.metadata.is_react_app);
    assert!(result.hydration.is_none());
    assert_eq!(result.rendered_content, result.text_content);
    assert_eq!(factory.log.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn surface_open_failure_fails_the_fetch() {
    let server = MockServer::start().await;
    mount_relay(&server, "first", ResponseTemplate::new(200).set_body_string(NEXT_PAGE), 1).await;

    let mut factory = FakeFactory::new(vec![hydrated()]);
    factory.fail_open = true;
    let p = pipeline(&[relay(&server, "first")], Some(Arc::new(factory)));

    let err = p.run(TARGET).await.unwrap_err();
    assert!(matches!(err, PipelineError::Render(RenderError::Surface(_))));
}

// ------------------------------
// Polling loop (paused clock)
// ------------------------------

fn renderer(factory: &Arc<FakeFactory>) -> HydrationRenderer {
    HydrationRenderer::new(factory.clone(), HydrationPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn never_hydrating_page_stops_at_the_attempt_cap() {
    let factory = Arc::new(FakeFactory::new(vec![shell()]));
    let url = Url::parse(TARGET).unwrap();

    let started = Instant::now();
    let content = renderer(&factory)
        .render_and_wait(&url, r#"<div id="root"></div>"#)
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert!(!content.ready);
    assert_eq!(content.attempts, 20);
    assert_eq!(content.text, "Loading...");
    // twenty polls plus the final read
    assert_eq!(factory.log.probes.load(Ordering::SeqCst), 21);
    assert_eq!(factory.log.torn_down.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn hydration_on_third_poll_stops_the_loop() {
    let factory = Arc::new(FakeFactory::new(vec![shell(), shell(), hydrated()]));
    let url = Url::parse(TARGET).unwrap();

    let started = Instant::now();
    let content = renderer(&factory)
        .render_and_wait(&url, r#"<div id="root"></div>"#)
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_millis(1000));
    assert!(content.ready);
    assert_eq!(content.attempts, 3);
    assert_eq!(content.text, "Acme rockets ship in a day");
    assert_eq!(factory.log.probes.load(Ordering::SeqCst), 4);
    assert_eq!(factory.log.torn_down.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_polls_count_as_not_ready() {
    let factory = Arc::new(FakeFactory::new(vec![None, None, hydrated()]));
    let url = Url::parse(TARGET).unwrap();

    let content = renderer(&factory)
        .render_and_wait(&url, r#"<div id="root"></div>"#)
        .await
        .unwrap();

    assert!(content.ready);
    assert_eq!(content.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn settle_delay_runs_before_first_poll() {
    let factory = Arc::new(FakeFactory::new(vec![hydrated()]));
    let url = Url::parse(TARGET).unwrap();
    let policy = HydrationPolicy {
        settle: Duration::from_millis(750),
        ..HydrationPolicy::default()
    };

    let started = Instant::now();
    let content = HydrationRenderer::new(factory.clone(), policy)
        .render_and_wait(&url, "<html><body></body></html>")
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_millis(750));
    assert_eq!(content.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_failure_keeps_the_content() {
    let mut factory = FakeFactory::new(vec![hydrated()]);
    factory.fail_teardown = true;
    let factory = Arc::new(factory);
    let url = Url::parse(TARGET).unwrap();

    let content = renderer(&factory)
        .render_and_wait(&url, r#"<div id="root"></div>"#)
        .await
        .unwrap();

    assert_eq!(content.text, "Acme rockets ship in a day");
    assert_eq!(factory.log.torn_down.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_final_reads_fall_back_and_still_tear_down() {
    // ready on the first poll, then the final text read fails
    let mut factory = FakeFactory::new(vec![hydrated(), None]);
    factory.fail_source = true;
    let factory = Arc::new(factory);
    let url = Url::parse(TARGET).unwrap();

    let content = renderer(&factory)
        .render_and_wait(&url, r#"<html><head></head><body><div id="root"></div></body></html>"#)
        .await
        .unwrap();

    assert!(content.ready);
    assert_eq!(content.text, "Acme rockets ship in a day");
    assert!(content.html.contains(r#"<base href="https://acme.test/app">"#));
    assert!(content.html.contains(r#"<div id="root"></div>"#));
    assert_eq!(factory.log.probes.load(Ordering::SeqCst), 2);
    assert_eq!(factory.log.torn_down.load(Ordering::SeqCst), 1);
}
