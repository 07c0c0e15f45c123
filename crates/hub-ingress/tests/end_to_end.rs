//! End-to-end scenarios driving a live `IngressServer` over real TCP
//! sockets, covering the representative flows of §8.

use std::sync::Arc;
use std::time::Duration;

use hub_core::mock::{Collection, MatchType, MockMatch, MockResponseSpec, MockRule, QueryParam};
use hub_core::{Mode, ModifiedResponse, Router};
use hub_flowstore::{FlowStore, FlowStoreConfig};
use hub_interceptor::ProjectInterceptor;
use hub_ingress::{IngressConfig, IngressServer};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

async fn reserve_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn flow_line(flow_id: &str, project_id: Option<&str>, package_name: Option<&str>) -> String {
    format!(
        r#"{{"flow_id":"{flow_id}","request":{{"method":"GET","url":"https://api.example.com/v1/widgets?id=7","headers":{{}},"body":""}},"response":null,"timestamp":0,"duration":0,"project_id":{project_id},"package_name":{package_name}}}"#,
        flow_id = flow_id,
        project_id = project_id.map_or("null".to_string(), |p| format!("\"{p}\"")),
        package_name = package_name.map_or("null".to_string(), |p| format!("\"{p}\"")),
    )
}

async fn send_line_and_read_response(port: u16, line: &str) -> ModifiedResponse {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();

    let mut buf = Vec::new();
    let mut reader = BufReader::new(stream);
    reader.read_until(b'\n', &mut buf).await.unwrap();
    let text = String::from_utf8(buf).unwrap();
    serde_json::from_str(text.trim_end()).unwrap()
}

#[tokio::test]
async fn ping_pong_round_trip() {
    let router = Arc::new(Router::new());
    let port = reserve_port().await;
    let server = IngressServer::new(IngressConfig { port, ..IngressConfig::default() }, router);
    server.start().await.unwrap();

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(b"PING\n").await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "PONG\n");

    server.stop().await;
}

#[tokio::test]
async fn unregistered_project_gets_original_sentinel() {
    let router = Arc::new(Router::new());
    let port = reserve_port().await;
    let server = IngressServer::new(IngressConfig { port, ..IngressConfig::default() }, router);
    server.start().await.unwrap();

    let response = send_line_and_read_response(port, &flow_line("f1", Some("missing"), None)).await;
    assert!(response.is_original());

    server.stop().await;
}

#[tokio::test]
async fn strict_package_filter_misses_are_not_routed() {
    let router = Arc::new(Router::new());
    let flow_store = Arc::new(FlowStore::new(FlowStoreConfig::default()));
    let rule_store = Arc::new(hub_core::mock::RuleStore::new(64));
    let interceptor = Arc::new(ProjectInterceptor::new("p1", Arc::clone(&flow_store), rule_store));
    router.register("p1", "Project One", Mode::Record, interceptor, Some("com.acme.app".into()));

    let port = reserve_port().await;
    let server = IngressServer::new(IngressConfig { port, ..IngressConfig::default() }, router);
    server.start().await.unwrap();

    let response =
        send_line_and_read_response(port, &flow_line("f1", None, Some("com.other.app"))).await;
    assert!(response.is_original());
    assert_eq!(flow_store.len(), 0);

    server.stop().await;
}

#[tokio::test]
async fn mock_mode_match_is_recorded_in_the_flow_store() {
    let router = Arc::new(Router::new());
    let flow_store = Arc::new(FlowStore::new(FlowStoreConfig::default()));
    let rule_store = Arc::new(hub_core::mock::RuleStore::new(64));
    rule_store.add_collection(Collection {
        id: "c1".into(),
        name: "Widgets".into(),
        package_name: None,
        enabled: true,
    });
    rule_store
        .add_rule(MockRule {
            id: "r1".into(),
            name: "widget lookup".into(),
            enabled: true,
            collection_id: "c1".into(),
            matcher: MockMatch {
                method: "GET".into(),
                scheme: String::new(),
                host: "api.example.com".into(),
                port: None,
                path: "/v1/widgets".into(),
                query_params: vec![QueryParam {
                    key: "id".into(),
                    value: "7".into(),
                    required: true,
                    match_type: MatchType::Exact,
                }],
            },
            response: MockResponseSpec {
                status_code: 201,
                headers: Default::default(),
                body: "{\"mocked\":true}".into(),
            },
        })
        .unwrap();

    let interceptor = Arc::new(ProjectInterceptor::new("p1", Arc::clone(&flow_store), rule_store));
    router.register("p1", "Project One", Mode::Mock, interceptor, None);

    let port = reserve_port().await;
    let server = IngressServer::new(IngressConfig { port, ..IngressConfig::default() }, router);
    server.start().await.unwrap();

    let response = send_line_and_read_response(port, &flow_line("f1", Some("p1"), None)).await;
    assert_eq!(response.status_code, Some(201));
    assert_eq!(flow_store.len(), 1);
    let recorded = &flow_store.all()[0];
    assert!(recorded.flags.mock_applied);

    server.stop().await;
}

#[tokio::test]
async fn debug_mode_suspends_and_resumes_on_resolve() {
    let router = Arc::new(Router::new());
    let flow_store = Arc::new(FlowStore::new(FlowStoreConfig::default()));
    let rule_store = Arc::new(hub_core::mock::RuleStore::new(64));
    let interceptor =
        Arc::new(ProjectInterceptor::new("p1", Arc::clone(&flow_store), rule_store).with_debug_timeout(Duration::from_secs(5)));
    router.register("p1", "Project One", Mode::Debug, Arc::clone(&interceptor) as _, None);

    let port = reserve_port().await;
    let server = IngressServer::new(IngressConfig { port, ..IngressConfig::default() }, router);
    server.start().await.unwrap();

    let client = tokio::spawn(async move {
        send_line_and_read_response(port, &flow_line("f1", Some("p1"), None)).await
    });

    // Give the server a moment to enqueue the pending debug entry
    // before we resolve it from the test.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let resolved = ModifiedResponse::full(299, Default::default(), "debugged".into());
    assert!(interceptor.resolve("f1", resolved.clone()));

    let response = client.await.unwrap();
    assert_eq!(response.status_code, Some(299));

    server.stop().await;
}

#[tokio::test]
async fn stop_cancels_pending_debug_awaits_instead_of_waiting_out_their_timeout() {
    let router = Arc::new(Router::new());
    let flow_store = Arc::new(FlowStore::new(FlowStoreConfig::default()));
    let rule_store = Arc::new(hub_core::mock::RuleStore::new(64));
    let interceptor = Arc::new(
        ProjectInterceptor::new("p1", Arc::clone(&flow_store), rule_store)
            .with_debug_timeout(Duration::from_secs(30)),
    );
    router.register("p1", "Project One", Mode::Debug, interceptor, None);

    let port = reserve_port().await;
    let config = IngressConfig {
        port,
        shutdown_grace: Duration::from_millis(200),
        ..IngressConfig::default()
    };
    let server = Arc::new(IngressServer::new(config, router));
    server.start().await.unwrap();

    let client =
        tokio::spawn(async move { send_line_and_read_response(port, &flow_line("f1", Some("p1"), None)).await });

    // Give the worker a moment to enqueue the pending debug entry
    // before we stop the server out from under it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    server.stop().await;
    let elapsed = started.elapsed();

    // cancel_pending() must unblock the worker before the join loop
    // times out waiting for it; well under the 30s debug timeout and
    // not much more than one grace period.
    assert!(elapsed < Duration::from_secs(2), "stop() took {elapsed:?}");

    let response = client.await.unwrap();
    assert!(response.is_original());
}

#[tokio::test]
async fn debug_mode_falls_back_to_original_on_timeout() {
    let router = Arc::new(Router::new());
    let flow_store = Arc::new(FlowStore::new(FlowStoreConfig::default()));
    let rule_store = Arc::new(hub_core::mock::RuleStore::new(64));
    let interceptor = Arc::new(
        ProjectInterceptor::new("p1", Arc::clone(&flow_store), rule_store)
            .with_debug_timeout(Duration::from_millis(30)),
    );
    router.register("p1", "Project One", Mode::Debug, interceptor, None);

    let port = reserve_port().await;
    let server = IngressServer::new(IngressConfig { port, ..IngressConfig::default() }, router);
    server.start().await.unwrap();

    let response = send_line_and_read_response(port, &flow_line("f1", Some("p1"), None)).await;
    assert!(response.is_original());

    server.stop().await;
}
