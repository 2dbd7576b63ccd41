use std::time::Duration;

use chatweave_core::error::{ExecutionError, ProviderError};
use chatweave_core::execution::{CodeExecutor, ExecutionRequest, StagedFile};
use chatweave_core::message::Message;
use chatweave_core::provider::{Provider, ProviderOutput, ProviderRequest, StreamEvent};
use chatweave_providers::{HttpCodeExecutor, OpenAiCompatProvider};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new("test", format!("{}/v1", server.uri()), "test-key")
}

fn request(stream: bool) -> ProviderRequest {
    ProviderRequest::new("gpt-4o-mini", vec![Message::user("Hi")]).streaming(stream)
}

async fn collect(mut rx: chatweave_core::provider::EventStream) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event.unwrap());
    }
    events
}

#[tokio::test]
async fn streams_sse_frames_in_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"selected_model_id\":\"gpt-4o\",\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let output = provider(&server).generate(request(true)).await.unwrap();
    let ProviderOutput::Stream(rx) = output else {
        panic!("expected a stream");
    };

    assert_eq!(
        collect(rx).await,
        vec![
            StreamEvent::SelectedModel("gpt-4o".into()),
            StreamEvent::text("Hel"),
            StreamEvent::text("lo"),
            StreamEvent::Done,
        ]
    );
}

#[tokio::test]
async fn stream_without_marker_still_finishes() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\ndata: {broken\n\n";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let ProviderOutput::Stream(rx) = provider(&server).generate(request(true)).await.unwrap() else {
        panic!("expected a stream");
    };
    assert_eq!(collect(rx).await, vec![StreamEvent::text("partial"), StreamEvent::Done]);
}

#[tokio::test]
async fn json_answer_to_streaming_request_is_single() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "Whole answer"}}]
        })))
        .mount(&server)
        .await;

    let output = provider(&server).generate(request(true)).await.unwrap();
    let ProviderOutput::Single(response) = output else {
        panic!("expected a single response");
    };
    assert_eq!(response.message.content, "Whole answer");
    assert_eq!(response.raw["choices"][0]["message"]["content"], "Whole answer");
}

#[tokio::test]
async fn non_streaming_request_completes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "{\"title\": \"Greeting\"}"}}],
            "usage": {"prompt_tokens": 4, "completion_tokens": 3, "total_tokens": 7}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = provider(&server).complete(request(false)).await.unwrap();
    assert_eq!(response.message.content, "{\"title\": \"Greeting\"}");
    assert_eq!(response.usage.unwrap().total_tokens, 7);
}

#[tokio::test]
async fn auth_and_rate_limit_errors_are_mapped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = provider(&server).generate(request(true)).await.unwrap_err();
    assert!(matches!(err, ProviderError::AuthenticationFailed(_)));

    let limited = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&limited)
        .await;
    let err = provider(&limited).complete(request(false)).await.unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited { .. }));
}

#[tokio::test]
async fn server_error_carries_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    match provider(&server).complete(request(false)).await.unwrap_err() {
        ProviderError::ApiError { status_code, message } => {
            assert_eq!(status_code, 500);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn executor_posts_code_and_files() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(body_partial_json(json!({
            "code": "print(1)",
            "timeout": 10,
            "files": [{"name": "data.csv", "content": "YSxi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "stdout": "1\n",
            "stderr": "",
            "files": [{"name": "plot.png", "bytes": "iVBO"}],
            "execution_id": "exec-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let executor = HttpCodeExecutor::new(format!("{}/execute", server.uri()), Duration::from_secs(5));
    let output = executor
        .execute(ExecutionRequest {
            code: "print(1)".into(),
            timeout_secs: 10,
            files: vec![StagedFile {
                name: "data.csv".into(),
                content: "YSxi".into(),
            }],
        })
        .await
        .unwrap();

    assert!(output.success);
    assert_eq!(output.stdout, "1\n");
    assert_eq!(output.files[0].name, "plot.png");
    assert_eq!(output.files[0].bytes.as_deref(), Some("iVBO"));
    assert_eq!(output.execution_id.as_deref(), Some("exec-1"));
}

#[tokio::test]
async fn executor_error_status_is_request_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("sandbox down"))
        .mount(&server)
        .await;

    let executor = HttpCodeExecutor::new(server.uri(), Duration::from_secs(5));
    let err = executor
        .execute(ExecutionRequest {
            code: "x".into(),
            timeout_secs: 10,
            files: vec![],
        })
        .await
        .unwrap_err();
    match err {
        ExecutionError::Request(message) => assert!(message.contains("503")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn executor_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let executor = HttpCodeExecutor::new(server.uri(), Duration::from_millis(200));
    let err = executor
        .execute(ExecutionRequest {
            code: "while True: pass".into(),
            timeout_secs: 10,
            files: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Timeout { .. }));
}
