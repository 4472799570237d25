//! Chat model client and AI flows against a mocked completions endpoint

use serde_json::json;
use student_portal::ai::{
    generate_progress_insights, generate_study_tips, ChatModelClient, GenerateRequest, ModelClient,
    ProgressInsightsInput, ProgressPoint, ProviderConfig, StudyTipsInput,
};
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client_for(server: &MockServer) -> ChatModelClient {
    ChatModelClient::with_provider(ProviderConfig {
        base_url: server.uri(),
        api_key: "sk-test".to_string(),
        model: "deepseek-chat".to_string(),
        max_tokens: 1024,
        extra_headers: Vec::new(),
    })
}

fn completion(content: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "deepseek-chat",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_generate_sends_schema_and_parses_object() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_string_contains("\"json_object\""))
        .and(body_string_contains("JSON schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("{\"tips\": \"- Review daily\"}"))))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let value = client
        .generate(&GenerateRequest {
            flow: "studyTips",
            prompt: "Tips for Biology".to_string(),
            output_schema: json!({"type": "object", "properties": {"tips": {"type": "string"}}}),
        })
        .await
        .unwrap();

    assert_eq!(value["tips"], "- Review daily");
}

#[tokio::test]
async fn test_fenced_content_is_unwrapped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(json!("```json\n{\"tips\": \"## Chemistry\\n- Flashcards\"}\n```"))),
        )
        .mount(&server)
        .await;

    let outcome = generate_study_tips(
        &client_for(&server),
        &StudyTipsInput {
            subject: "Chemistry".to_string(),
        },
    )
    .await;

    assert!(!outcome.is_fallback());
    assert!(outcome.value().tips.contains("Flashcards"));
}

#[tokio::test]
async fn test_provider_error_serves_fallback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let outcome = generate_study_tips(
        &client_for(&server),
        &StudyTipsInput {
            subject: "History".to_string(),
        },
    )
    .await;

    assert!(outcome.is_fallback());
    assert!(outcome.fallback_reason().unwrap().contains("500"));
    assert!(outcome.value().tips.starts_with("## Study Tips for History"));
}

#[tokio::test]
async fn test_non_json_reply_serves_fallback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("Sure! Here are some insights."))))
        .mount(&server)
        .await;

    let input = ProgressInsightsInput {
        subject: "Math".to_string(),
        progress_data: vec![
            ProgressPoint {
                month: "January".to_string(),
                progress: 60.0,
            },
            ProgressPoint {
                month: "February".to_string(),
                progress: 75.0,
            },
        ],
    };
    let outcome = generate_progress_insights(&client_for(&server), &input).await;

    assert!(outcome.is_fallback());
    assert!(outcome.value().insights.contains("75% in February"));
}

#[tokio::test]
async fn test_invalid_input_never_calls_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("{\"tips\": \"x\"}"))))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = generate_study_tips(
        &client_for(&server),
        &StudyTipsInput {
            subject: "   ".to_string(),
        },
    )
    .await;

    assert!(outcome.is_fallback());
}
