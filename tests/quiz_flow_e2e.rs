use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quiz_solver::clients::ChatProvider;
use quiz_solver::error::LlmError;
use quiz_solver::models::FailureKind;
use quiz_solver::{build_renderer, Config, FinalOutcome, LlmGateway, QuizFlow, QuizReport};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMAIL: &str = "student@example.com";
const SECRET: &str = "s3cret";

/// 按提示词内容作答的 LLM，记录调用次数
struct ScriptedLlm<F> {
    calls: AtomicUsize,
    respond: F,
}

impl<F> ScriptedLlm<F>
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync,
{
    fn new(respond: F) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            respond,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> ChatProvider for ScriptedLlm<F>
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync,
{
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, user_message: &str, _: Option<&str>) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(user_message)
    }
}

fn is_extraction(prompt: &str) -> bool {
    prompt.starts_with("Extract the following")
}

fn reply(value: Value) -> Result<String, LlmError> {
    Ok(value.to_string())
}

fn test_config(server: &MockServer, max_steps: usize) -> Config {
    let mut config = Config::default();
    config.quiz_email = EMAIL.to_string();
    config.quiz_secret = SECRET.to_string();
    config.max_steps = max_steps;
    config.request_timeout_secs = 5;
    config.llm_timeout_secs = 5;
    config.renderer.browserless_token = Some("render-token".to_string());
    config.renderer.browserless_base_url = server.uri();
    config.renderer.render_linked_pages = false;
    config
}

async fn solve(
    server: &MockServer,
    max_steps: usize,
    llm: Arc<dyn ChatProvider>,
    start_url: &str,
) -> QuizReport {
    let config = test_config(server, max_steps);
    let renderer = tokio_test::assert_ok!(build_renderer(&config).await);
    let gateway = Arc::new(LlmGateway::new(llm, None, Duration::from_secs(5)));
    let flow = tokio_test::assert_ok!(QuizFlow::new(&config, renderer, gateway));
    flow.run_session(start_url, EMAIL).await
}

/// Browserless 渲染接口返回的页面
async fn mount_page(server: &MockServer, page_url: &str, html: &str) {
    Mock::given(method("POST"))
        .and(path("/content"))
        .and(body_partial_json(json!({ "url": page_url })))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

async fn mount_submit(server: &MockServer, expected: Value, response: Value, times: u64) {
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_partial_json(expected))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn single_step_arithmetic_quiz_completes() {
    let server = MockServer::start().await;
    let page = format!("{}/quiz/1", server.uri());
    mount_page(
        &server,
        &page,
        "<html><body><p>What is 2+2? POST your answer to /submit</p></body></html>",
    )
    .await;
    mount_submit(
        &server,
        json!({"email": EMAIL, "secret": SECRET, "url": page, "answer": 4}),
        json!({"status": "completed", "correct": true}),
        1,
    )
    .await;

    let llm = ScriptedLlm::new(|prompt: &str| {
        if is_extraction(prompt) {
            reply(json!({
                "question": "What is 2+2?",
                "submit_url": "/submit",
                "answer_format": "number",
                "links": []
            }))
        } else {
            reply(json!({"answer": "4"}))
        }
    });

    let report = solve(&server, 5, llm.clone(), &page).await;

    assert_eq!(report.outcome, FinalOutcome::correct());
    assert_eq!(
        serde_json::to_value(&report.outcome).unwrap(),
        json!({"status": "completed", "correct": true})
    );
    assert_eq!(report.session.step_count(), 1);
    assert_eq!(report.session.history()[0].answer_submitted, json!(4));
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn csv_sum_is_computed_without_the_model() {
    let server = MockServer::start().await;
    let page = format!("{}/quiz/csv", server.uri());
    mount_page(
        &server,
        &page,
        r#"<html><body><p>Download <a href="/data/prices.csv">the file</a>.
           What is the sum of the price column?</p></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/data/prices.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/csv")
                .set_body_string("item,price\nlamp,10.25\ndesk,20.5\nchair,30\nrug,0.1\nmug,0.2\n"),
        )
        .mount(&server)
        .await;
    mount_submit(
        &server,
        json!({"answer": 61.05}),
        json!({"status": "completed", "correct": true}),
        1,
    )
    .await;

    // 推理答案故意给错，证明求和没有经过模型
    let llm = ScriptedLlm::new(|prompt: &str| {
        if is_extraction(prompt) {
            reply(json!({
                "question": "What is the sum of the price column?",
                "submit_url": "/submit",
                "answer_format": "number",
                "links": [{"url": "/data/prices.csv", "kind": "file", "mime": "text/csv"}]
            }))
        } else {
            reply(json!({"answer": 61.0}))
        }
    });

    let report = solve(&server, 5, llm.clone(), &page).await;

    assert_eq!(report.outcome, FinalOutcome::correct());
    assert_eq!(report.session.history()[0].answer_submitted, json!(61.05));
    assert_eq!(llm.calls(), 1, "only the extraction should reach the model");
}

#[tokio::test]
async fn two_step_quiz_reports_final_reason_verbatim() {
    let server = MockServer::start().await;
    let first = format!("{}/quiz/1", server.uri());
    let second = format!("{}/quiz/2", server.uri());
    mount_page(
        &server,
        &first,
        "<html><body>QUIZ-ONE: name the capital of France</body></html>",
    )
    .await;
    mount_page(
        &server,
        &second,
        "<html><body>QUIZ-TWO: list three primes</body></html>",
    )
    .await;

    mount_submit(
        &server,
        json!({"url": first, "answer": "Paris"}),
        json!({"correct": true, "url": second}),
        1,
    )
    .await;
    mount_submit(
        &server,
        json!({"url": second}),
        json!({"status": "completed", "correct": false, "reason": "wrong format"}),
        1,
    )
    .await;

    let llm = ScriptedLlm::new(|prompt: &str| {
        if is_extraction(prompt) && prompt.contains("QUIZ-ONE") {
            reply(json!({
                "question": "Name the capital of France",
                "submit_url": "/submit",
                "answer_format": "text"
            }))
        } else if is_extraction(prompt) {
            reply(json!({
                "question": "List three primes",
                "submit_url": "/submit",
                "answer_format": "list"
            }))
        } else if prompt.contains("capital of France") {
            reply(json!({"answer": " Paris "}))
        } else {
            reply(json!({"answer": [2, 3, 5]}))
        }
    });

    let report = solve(&server, 5, llm, &first).await;

    assert_eq!(
        report.outcome,
        FinalOutcome::incorrect(Some("wrong format".to_string()))
    );
    assert_eq!(report.session.step_count(), 2);
    assert_eq!(report.session.history()[1].page_url, second);
    assert_eq!(report.session.history()[1].answer_submitted, json!([2, 3, 5]));
}

#[tokio::test]
async fn one_failing_link_does_not_abort_the_step() {
    let server = MockServer::start().await;
    let page = format!("{}/quiz/files", server.uri());
    mount_page(
        &server,
        &page,
        "<html><body>Add the values from the three files.</body></html>",
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("alpha=1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/c.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("gamma=3"))
        .mount(&server)
        .await;
    // /files/b.csv 未挂载，返回 404
    mount_submit(
        &server,
        json!({"answer": 4}),
        json!({"status": "completed", "correct": true}),
        1,
    )
    .await;

    let llm = ScriptedLlm::new(|prompt: &str| {
        if is_extraction(prompt) {
            return reply(json!({
                "question": "Add the values from the three files.",
                "submit_url": "/submit",
                "answer_format": "number",
                "links": ["/files/a.txt", "/files/b.csv", "/files/c.txt"]
            }));
        }
        if prompt.contains("alpha=1")
            && prompt.contains("gamma=3")
            && prompt.contains("[content unavailable")
        {
            reply(json!({"answer": 4}))
        } else {
            reply(json!({"answer": null}))
        }
    });

    let report = solve(&server, 5, llm, &page).await;

    assert_eq!(report.outcome, FinalOutcome::correct());
}

#[tokio::test]
async fn endless_quiz_stops_at_step_limit() {
    let server = MockServer::start().await;
    let page = format!("{}/quiz/loop", server.uri());
    mount_page(&server, &page, "<html><body>Say hi</body></html>").await;
    mount_submit(
        &server,
        json!({"answer": "hi"}),
        json!({"correct": true, "url": page}),
        2,
    )
    .await;

    let llm = ScriptedLlm::new(|prompt: &str| {
        if is_extraction(prompt) {
            reply(json!({"question": "Say hi", "submit_url": "/submit", "answer_format": "text"}))
        } else {
            reply(json!({"answer": "hi"}))
        }
    });

    let report = solve(&server, 2, llm, &page).await;

    assert!(matches!(
        report.outcome,
        FinalOutcome::Incomplete {
            error: FailureKind::StepLimitExceeded,
            ..
        }
    ));
    assert_eq!(report.session.step_count(), 2);
}

#[tokio::test]
async fn missing_submit_url_aborts_without_submitting() {
    let server = MockServer::start().await;
    let page = format!("{}/quiz/broken", server.uri());
    mount_page(&server, &page, "<html><body>Nothing to see</body></html>").await;
    mount_submit(&server, json!({}), json!({"correct": true}), 0).await;

    let llm = ScriptedLlm::new(|_: &str| reply(json!({"question": "What?"})));
    let report = solve(&server, 5, llm, &page).await;

    assert!(matches!(
        report.outcome,
        FinalOutcome::Incomplete {
            error: FailureKind::ExtractionIncomplete,
            ..
        }
    ));
    assert_eq!(report.session.step_count(), 0);
}

#[tokio::test]
async fn rejected_submission_is_not_retried() {
    let server = MockServer::start().await;
    let page = format!("{}/quiz/1", server.uri());
    mount_page(&server, &page, "<html><body>What is 1+1?</body></html>").await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let llm = ScriptedLlm::new(|prompt: &str| {
        if is_extraction(prompt) {
            reply(json!({
                "question": "What is 1+1?",
                "submit_url": "/submit",
                "answer_format": "number"
            }))
        } else {
            reply(json!({"answer": 2}))
        }
    });

    let outcome = solve(&server, 5, llm, &page).await.outcome;

    assert!(matches!(
        outcome,
        FinalOutcome::Incomplete {
            error: FailureKind::SubmissionFailure,
            ..
        }
    ));
}

#[tokio::test]
async fn render_and_reasoning_failures_become_incomplete_outcomes() {
    let server = MockServer::start().await;

    // 渲染服务没有这个页面
    let llm = ScriptedLlm::new(|_: &str| reply(json!({})));
    let outcome = solve(&server, 5, llm.clone(), &format!("{}/quiz/none", server.uri()))
        .await
        .outcome;
    assert!(matches!(
        outcome,
        FinalOutcome::Incomplete {
            error: FailureKind::RenderFailure,
            ..
        }
    ));
    assert_eq!(llm.calls(), 0);

    // 模型始终不可用
    let page = format!("{}/quiz/1", server.uri());
    mount_page(&server, &page, "<html><body>What is 1+1?</body></html>").await;
    let down = ScriptedLlm::new(|_: &str| {
        Err(LlmError::RequestFailed {
            provider: "scripted".to_string(),
            message: "HTTP 503".to_string(),
        })
    });
    let outcome = solve(&server, 5, down, &page).await.outcome;
    let shape = serde_json::to_value(&outcome).unwrap();
    assert_eq!(shape["status"], "incomplete");
    assert_eq!(shape["error"], "reasoning_unavailable");
}
