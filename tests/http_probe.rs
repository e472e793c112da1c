use link_prober::events::{TransportEventHub, TransportEventKind};
use link_prober::fetch::{ContentFetcher, FetchOutcome, HttpFetcher};
use link_prober::url_utils::url_patterns;
use link_prober::{Config, Prober, ScanSession, ScanSummary};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn mock_redirect(server: &MockServer, route: &str, status: u16, location: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).insert_header("Location", location))
        .mount(server)
        .await;
}

/// A port nothing listens on.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn fetcher_publishes_lifecycle_events() {
    let server = MockServer::start().await;
    mock_status(&server, "/", 200).await;

    let url = Url::parse(&format!("{}/", server.uri())).unwrap();
    let hub = TransportEventHub::new();
    let mut subscription = hub.subscribe(url_patterns(&url));
    let fetcher = HttpFetcher::from_config(&Config::default()).unwrap();

    let outcome = fetcher.fetch(&url, &hub, CancellationToken::new()).await;
    assert_eq!(outcome, FetchOutcome::Responded { status: 200 });

    let first = subscription.try_recv().unwrap();
    assert_eq!(first.kind, TransportEventKind::ResponseStarted { status: 200 });
    let second = subscription.try_recv().unwrap();
    assert_eq!(second.kind, TransportEventKind::Completed { status: 200 });
    assert!(subscription.try_recv().is_none());
}

#[tokio::test]
async fn fetcher_follows_redirects_hop_by_hop() {
    let server = MockServer::start().await;
    mock_redirect(&server, "/old", 301, "/new").await;
    mock_status(&server, "/new", 200).await;

    let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
    let hub = TransportEventHub::new();
    let mut subscription = hub.subscribe(url_patterns(&url));
    let fetcher = HttpFetcher::from_config(&Config::default()).unwrap();

    let outcome = fetcher.fetch(&url, &hub, CancellationToken::new()).await;
    assert_eq!(outcome, FetchOutcome::Responded { status: 200 });

    let mut kinds = Vec::new();
    while let Some(event) = subscription.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            TransportEventKind::ResponseStarted { status: 301 },
            TransportEventKind::BeforeRedirect {
                redirect_url: format!("{}/new", server.uri()),
            },
            TransportEventKind::ResponseStarted { status: 200 },
            TransportEventKind::Completed { status: 200 },
        ]
    );
}

#[tokio::test]
async fn fetcher_stops_at_redirect_limit() {
    let server = MockServer::start().await;
    mock_redirect(&server, "/loop", 302, "/loop").await;

    let url = Url::parse(&format!("{}/loop", server.uri())).unwrap();
    let hub = TransportEventHub::new();
    let fetcher = HttpFetcher::new("test-agent", 2).unwrap();

    let outcome = fetcher.fetch(&url, &hub, CancellationToken::new()).await;
    assert_eq!(outcome, FetchOutcome::Responded { status: 302 });
}

#[tokio::test]
async fn fetcher_announces_redirect_it_does_not_follow() {
    let server = MockServer::start().await;
    mock_redirect(&server, "/old", 301, "/new").await;

    let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
    let hub = TransportEventHub::new();
    let mut subscription = hub.subscribe(url_patterns(&url));
    let fetcher = HttpFetcher::new("test-agent", 0).unwrap();

    let outcome = fetcher.fetch(&url, &hub, CancellationToken::new()).await;
    assert_eq!(outcome, FetchOutcome::Responded { status: 301 });

    let mut kinds = Vec::new();
    while let Some(event) = subscription.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            TransportEventKind::ResponseStarted { status: 301 },
            TransportEventKind::BeforeRedirect {
                redirect_url: format!("{}/new", server.uri()),
            },
            TransportEventKind::Completed { status: 301 },
        ]
    );
}

#[tokio::test]
async fn redirect_without_following_is_still_valid() {
    let server = MockServer::start().await;
    mock_redirect(&server, "/old", 301, "/new").await;

    let config = Config {
        max_redirects: 0,
        ..Config::default()
    };
    let prober = Prober::new(&config).unwrap();
    let verdict = prober.probe(&format!("{}/old", server.uri())).await;

    assert!(verdict.is_valid, "{:?}", verdict);
    assert_eq!(verdict.reason_str(), format!("Redirected to {}/new", server.uri()));
    assert_eq!(verdict.redirect_url, Some(format!("{}/new", server.uri())));
}

#[tokio::test]
async fn redirect_chain_past_limit_reports_latest_target() {
    let server = MockServer::start().await;
    mock_redirect(&server, "/a", 301, "/b").await;
    mock_redirect(&server, "/b", 302, "/c").await;
    mock_status(&server, "/c", 200).await;

    let config = Config {
        max_redirects: 1,
        ..Config::default()
    };
    let prober = Prober::new(&config).unwrap();
    let verdict = prober.probe(&format!("{}/a", server.uri())).await;

    assert!(verdict.is_valid);
    assert_eq!(verdict.redirect_url, Some(format!("{}/c", server.uri())));
}

#[tokio::test]
async fn probe_live_page() {
    let server = MockServer::start().await;
    mock_status(&server, "/", 200).await;

    let prober = Prober::new(&Config::default()).unwrap();
    let verdict = prober.probe(&format!("{}/", server.uri())).await;

    assert!(verdict.is_valid);
    assert!(verdict.reason.is_none());
    assert_eq!(prober.deadline().sample_count(), 1);
}

#[tokio::test]
async fn probe_missing_page() {
    let server = MockServer::start().await;
    mock_status(&server, "/missing", 404).await;

    let prober = Prober::new(&Config::default()).unwrap();
    let verdict = prober.probe(&format!("{}/missing", server.uri())).await;

    assert!(!verdict.is_valid);
    assert_eq!(verdict.reason_str(), "Page not found");
}

#[tokio::test]
async fn probe_reports_redirect_target() {
    let server = MockServer::start().await;
    mock_redirect(&server, "/old", 301, "/new").await;
    mock_status(&server, "/new", 200).await;

    let prober = Prober::new(&Config::default()).unwrap();
    let verdict = prober.probe(&format!("{}/old", server.uri())).await;

    assert!(verdict.is_valid);
    assert_eq!(verdict.redirect_url, Some(format!("{}/new", server.uri())));
}

#[tokio::test]
async fn probe_lenient_statuses() {
    let server = MockServer::start().await;
    mock_status(&server, "/login", 401).await;
    mock_status(&server, "/busy", 503).await;
    mock_status(&server, "/broken", 502).await;

    let prober = Prober::new(&Config::default()).unwrap();

    let verdict = prober.probe(&format!("{}/login", server.uri())).await;
    assert!(verdict.is_valid);
    assert_eq!(verdict.reason_str(), "Requires authentication");

    let verdict = prober.probe(&format!("{}/busy", server.uri())).await;
    assert!(verdict.is_valid);
    assert_eq!(verdict.reason_str(), "Server temporarily unavailable");

    let verdict = prober.probe(&format!("{}/broken", server.uri())).await;
    assert!(!verdict.is_valid);
    assert_eq!(verdict.reason_str(), "Bad Gateway");
}

#[tokio::test]
async fn probe_refused_connection_suggests_other_scheme() {
    let port = closed_port();
    let prober = Prober::new(&Config::default()).unwrap();

    let verdict = prober.probe(&format!("http://127.0.0.1:{}/", port)).await;

    assert!(verdict.is_valid);
    assert!(verdict.reason_str().contains("CONNECTION_REFUSED"), "{:?}", verdict);
    assert_eq!(verdict.alternate_url, Some(format!("https://127.0.0.1:{}/", port)));
}

#[tokio::test]
async fn scan_session_checks_everything_in_order() {
    let server = MockServer::start().await;
    mock_status(&server, "/a/", 200).await;
    mock_status(&server, "/b/", 404).await;
    mock_status(&server, "/c/", 429).await;

    let session = ScanSession::new(&Config::default()).unwrap();
    let urls: Vec<String> = ["/a/", "/b/", "/c/"]
        .iter()
        .map(|route| format!("{}{}", server.uri(), route))
        .collect();

    let results = session.scan_all(&urls).await;
    let returned: Vec<String> = results.iter().map(|(url, _)| url.clone()).collect();
    assert_eq!(returned, urls);

    let summary = ScanSummary::from_verdicts(results.iter().map(|(_, verdict)| verdict));
    assert_eq!(summary.total, 3);
    assert_eq!(summary.valid, 2);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.advisory, 1);
    assert_eq!(session.in_flight(), 0);
}
