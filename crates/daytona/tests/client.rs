use daytona::{
    CreateSandbox, DaytonaClient, DaytonaConfig, DaytonaError, ExecuteRequest,
    SessionExecuteRequest,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> DaytonaClient {
    let config = DaytonaConfig::with_api_key("test-key").base_url(server.uri());
    DaytonaClient::new(config).expect("client should build")
}

#[tokio::test]
async fn test_create_sandbox_sends_auth_and_parses_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandbox"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "snapshot": "daytonaio/sandbox:latest",
            "target": "us",
            "autoStopInterval": 30,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sb-123",
            "state": "started",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = CreateSandbox::new("daytonaio/sandbox:latest")
        .target("us")
        .auto_stop_interval(30);
    let sandbox = client.create_sandbox(&request).await.expect("create");
    assert_eq!(sandbox.id, "sb-123");
}

#[tokio::test]
async fn test_organization_header_is_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sandbox/sb-1"))
        .and(header("X-Daytona-Organization-ID", "org-9"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"id": "sb-1", "state": "started"})),
        )
        .mount(&server)
        .await;

    let config = DaytonaConfig::with_api_key("test-key")
        .base_url(server.uri())
        .organization_id("org-9");
    let client = DaytonaClient::new(config).expect("client should build");
    let sandbox = client.get_sandbox("sb-1").await.expect("get");
    assert_eq!(sandbox.id, "sb-1");
}

#[tokio::test]
async fn test_execute_command_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toolbox/sb-1/toolbox/process/execute"))
        .and(body_partial_json(serde_json::json!({
            "command": "echo hi",
            "cwd": "/home/daytona",
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"code": 0, "result": "hi\n"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = ExecuteRequest::new("echo hi").cwd("/home/daytona");
    let response = client.execute_command("sb-1", &request).await.expect("exec");
    assert_eq!(response.exit_code(), 0);
    assert_eq!(response.result, "hi\n");
}

#[tokio::test]
async fn test_session_exec_and_logs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toolbox/sb-1/toolbox/process/session"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/toolbox/sb-1/toolbox/process/session/s-1/exec"))
        .and(body_partial_json(serde_json::json!({
            "command": "ls",
            "runAsync": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cmdId": "cmd-7",
            "output": "",
            "exitCode": 0,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(
            "/toolbox/sb-1/toolbox/process/session/s-1/command/cmd-7/logs",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string("a.txt\nb.txt\n"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.create_session("sb-1", "s-1").await.expect("create session");
    let response = client
        .execute_session_command("sb-1", "s-1", &SessionExecuteRequest::new("ls"))
        .await
        .expect("session exec");
    assert_eq!(response.cmd_id.as_deref(), Some("cmd-7"));
    assert_eq!(response.exit_code, Some(0));

    let logs = client
        .get_session_command_logs("sb-1", "s-1", "cmd-7")
        .await
        .expect("logs");
    assert_eq!(logs, "a.txt\nb.txt\n");
}

#[tokio::test]
async fn test_file_ops_use_path_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toolbox/sb-1/toolbox/files/folder"))
        .and(query_param("path", "/home/daytona/src"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/toolbox/sb-1/toolbox/files/download"))
        .and(query_param("path", "/home/daytona/a.py"))
        .respond_with(ResponseTemplate::new(200).set_body_string("print(1)\n"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .create_folder("sb-1", "/home/daytona/src")
        .await
        .expect("create folder");
    let content = client
        .download_file("sb-1", "/home/daytona/a.py")
        .await
        .expect("download");
    assert_eq!(content, b"print(1)\n".to_vec());
}

#[tokio::test]
async fn test_api_error_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toolbox/sb-1/toolbox/process/session"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(serde_json::json!({"message": "session already exists"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .create_session("sb-1", "dup")
        .await
        .expect_err("conflict should error");
    match &err {
        DaytonaError::ApiError { status, message } => {
            assert_eq!(*status, 409);
            assert_eq!(message, "session already exists");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn test_unauthorized_maps_to_dedicated_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sandbox/sb-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.get_sandbox("sb-1").await.expect_err("401");
    assert!(matches!(err, DaytonaError::Unauthorized));
}
