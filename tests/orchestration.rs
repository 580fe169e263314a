//! End-to-end tests of the tool-use loop against scripted providers.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codeloop::engine::{EngineError, FnGate, FnHandler, InvocationHandler, CANCELLED_RESPONSE};
use codeloop::llm::LLMError;
use codeloop::messages::{Invocation, MemoryEntry, MessageRole};
use codeloop::orchestrator::{Orchestrator, StreamEvent, CANCELLED_MESSAGE};
use codeloop::types::InvocationId;
use common::{Reply, Scripted};
use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const CALC_REPLY: &str = "Calc:\n\n> S id1/do/exec/code\n```code\n2+2\n```\n\nDone.";

fn four() -> Arc<dyn InvocationHandler> {
    Arc::new(FnHandler::new(|_: &Invocation| -> Result<String, EngineError> {
        Ok("4".to_string())
    }))
}

fn id(raw: &str) -> InvocationId {
    InvocationId::parse(raw).unwrap()
}

#[tokio::test]
async fn calc_example_round_trip() {
    let provider = Scripted::new(vec![Reply::text(CALC_REPLY), Reply::text("All set.")]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .sentinel("S ")
        .handler(four())
        .build()
        .unwrap();

    let output = orchestrator.run("What is 2+2?").await.unwrap();

    assert!(output.contains("Calc:"));
    assert!(output.contains("Done."));
    assert!(output.contains("2+2"));
    assert!(output.contains('4'));
    assert!(!output.contains("> S id1/do/exec/code"));
    assert!(output.contains("All set."));
    assert_eq!(provider.calls(), 2);
    assert_eq!(orchestrator.get_result(&id("id1")), Some(&json!(4)));
}

#[tokio::test]
async fn second_call_sees_executed_code_and_result() {
    let provider = Scripted::new(vec![Reply::text(CALC_REPLY), Reply::text("It is 4.")]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .sentinel("S ")
        .handler(four())
        .build()
        .unwrap();

    orchestrator.run("What is 2+2?").await.unwrap();

    let second = provider.request(1);
    assert_eq!(second[0].role, MessageRole::System);
    assert!(second[0].content.contains("id1"));
    assert!(second
        .iter()
        .any(|m| m.content.contains("2+2") && m.content.contains('4')));
    assert!(!second.iter().any(|m| m.content.contains("> S id1")));
}

#[tokio::test]
async fn ceiling_bounds_provider_calls() {
    let looping: Vec<Reply> = (0..10)
        .map(|i| Reply::text(format!("> @@step{i}/do/exec/code\n```code\n{i}\n```")))
        .collect();
    let provider = Scripted::new(looping);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .handler(four())
        .max_iterations(4)
        .build()
        .unwrap();

    orchestrator.run("loop forever").await.unwrap();

    assert_eq!(provider.calls(), 4);
    assert_eq!(orchestrator.execution_history().count(), 4);
}

#[tokio::test]
async fn script_engine_keeps_bindings_between_iterations() {
    let provider = Scripted::new(vec![
        Reply::text("> @@first/do/exec/code\n```\nlet x = 6 * 7;\nx\n```"),
        Reply::text("> @@second/do/exec/code\n```\nx + 1\n```"),
        Reply::text("Finished."),
    ]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let output = orchestrator.run("compute").await.unwrap();

    assert_eq!(orchestrator.get_result(&id("first")), Some(&json!(42)));
    assert_eq!(orchestrator.get_result(&id("second")), Some(&json!(43)));
    assert!(output.ends_with("Finished."));
}

#[tokio::test]
async fn failing_invocation_is_reported_not_recorded() {
    let provider = Scripted::new(vec![
        Reply::text("> @@bad/do/exec/code\n```\nthrow \"nope\";\n```"),
        Reply::text("Sorry."),
    ]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let output = orchestrator.run("try").await.unwrap();

    assert!(output.contains("Error:"));
    assert!(!orchestrator.has_result(&id("bad")));
    assert_eq!(orchestrator.execution_history().count(), 0);
}

#[tokio::test]
async fn rejected_gate_skips_execution() {
    let provider = Scripted::new(vec![
        Reply::text("> @@risky/do/terminal/sh\n```sh\necho hi\n```"),
        Reply::text("Understood."),
    ]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .gate(Arc::new(FnGate::new(|_: &Invocation| false)))
        .build()
        .unwrap();

    orchestrator.run("run it").await.unwrap();

    assert!(!orchestrator.has_result(&id("risky")));
}

#[tokio::test]
async fn observer_sees_every_append() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let provider = Scripted::new(vec![Reply::text(CALC_REPLY), Reply::text("Ok.")]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider)
        .sentinel("S ")
        .handler(four())
        .observer(move |_: &MemoryEntry| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    orchestrator.run("go").await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), orchestrator.memory().len());
}

#[tokio::test]
async fn mid_run_provider_error_keeps_partial_output() {
    let provider = Scripted::new(vec![
        Reply::text(CALC_REPLY),
        Reply::Fail(LLMError::network("connection reset")),
    ]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider)
        .sentinel("S ")
        .handler(four())
        .build()
        .unwrap();

    let output = orchestrator.run("go").await.unwrap();
    assert!(output.contains("Calc:"));
}

#[tokio::test]
async fn cancelling_a_hung_request_ends_the_run() {
    let provider = Scripted::new(vec![Reply::Hang, Reply::text("never asked")]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .build()
        .unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let error = tokio::time::timeout(Duration::from_secs(5), orchestrator.run_with_cancel("hi", token))
        .await
        .expect("run should stop once cancelled")
        .unwrap_err();

    assert!(error.is_cancelled());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn custom_handler_still_passes_the_gate() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let provider = Scripted::new(vec![
        Reply::text("> @@guarded/do/exec/code\n```code\n1\n```"),
        Reply::text("Fine."),
    ]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider)
        .handler(Arc::new(FnHandler::new(move |_: &Invocation| -> Result<String, EngineError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("1".to_string())
        })))
        .gate(Arc::new(FnGate::new(|_: &Invocation| false)))
        .build()
        .unwrap();

    let output = orchestrator.run("go").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!orchestrator.has_result(&id("guarded")));
    assert!(output.contains(CANCELLED_RESPONSE));
}

// =============================================================================
// Streaming
// =============================================================================

fn names(events: &[StreamEvent]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = events.iter().map(StreamEvent::name).collect();
    names.dedup_by(|a, b| *a == "text" && *b == "text");
    names
}

#[tokio::test]
async fn stream_reports_events_in_order() {
    let provider = Scripted::new(vec![
        Reply::chunks(&[
            "Calc:\n\n> S id1/do/exec/code\n",
            "```code\n2+",
            "2\n",
            "```\n",
            "\nDone.",
        ]),
        Reply::chunks(&["All ", "set."]),
    ]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .sentinel("S ")
        .handler(four())
        .build()
        .unwrap();

    let events: Vec<StreamEvent> = orchestrator.run_stream("What is 2+2?").collect().await;

    assert_eq!(
        names(&events),
        vec![
            "thinking",
            "text",
            "code_found",
            "code_executing",
            "code_result",
            "text",
            "iteration",
            "thinking",
            "text",
            "complete",
        ]
    );

    let found_at = events.iter().position(|e| e.name() == "code_found").unwrap();
    match &events[found_at - 1] {
        StreamEvent::Text { accumulated, .. } => assert!(accumulated.ends_with("```\n")),
        other => panic!("expected text before code_found, got {other:?}"),
    }

    match &events[found_at + 2] {
        StreamEvent::CodeResult { id: got, result, success } => {
            assert_eq!(got, &id("id1"));
            assert_eq!(result, "4");
            assert!(success);
        }
        other => panic!("expected code_result, got {other:?}"),
    }

    match events.last().unwrap() {
        StreamEvent::Complete { final_response, iterations } => {
            assert_eq!(*iterations, 2);
            assert!(final_response.contains("Calc:"));
            assert!(final_response.contains("All set."));
            assert!(!final_response.contains("> S id1"));
        }
        other => panic!("expected complete, got {other:?}"),
    }
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn stream_ceiling_bounds_provider_calls() {
    let looping: Vec<Reply> = (0..5)
        .map(|i| {
            let marker = format!("> @@s{i}/do/exec/code\n");
            Reply::chunks(&["Again.\n", marker.as_str(), "```code\n1\n```\n"])
        })
        .collect();
    let provider = Scripted::new(looping);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .handler(four())
        .max_iterations(2)
        .build()
        .unwrap();

    let events: Vec<StreamEvent> = orchestrator.run_stream("loop forever").collect().await;

    assert_eq!(provider.calls(), 2);
    assert_eq!(events.iter().filter(|e| e.name() == "iteration").count(), 1);
    assert_eq!(events.iter().filter(|e| e.name() == "code_result").count(), 2);
    match events.last().unwrap() {
        StreamEvent::Complete { iterations, .. } => assert_eq!(*iterations, 2),
        other => panic!("expected complete, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_code_only_reply_adds_no_empty_assistant_turn() {
    let provider = Scripted::new(vec![
        Reply::chunks(&["> @@bare/do/exec/code\n", "```code\n1\n```\n"]),
        Reply::chunks(&["Done."]),
    ]);
    let mut orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .handler(four())
        .build()
        .unwrap();

    let events: Vec<StreamEvent> = orchestrator.run_stream("go").collect().await;
    assert_eq!(events.last().map(StreamEvent::name), Some("complete"));

    assert!(!orchestrator.memory().entries().iter().any(|entry| matches!(
        entry,
        MemoryEntry::Message(m) if m.role == MessageRole::Assistant && m.content.is_empty()
    )));
    assert!(!provider
        .request(1)
        .iter()
        .any(|m| m.role == MessageRole::Assistant && m.content.is_empty()));
}

#[tokio::test]
async fn stream_open_failure_is_a_single_error_event() {
    let provider = Scripted::new(vec![Reply::Fail(LLMError::authentication_failed("bad key"))]);
    let mut orchestrator = Orchestrator::builder().provider(provider).build().unwrap();

    let events: Vec<StreamEvent> = orchestrator.run_stream("hi").collect().await;

    assert_eq!(names(&events), vec!["thinking", "error"]);
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_token() {
    let provider = Scripted::new(vec![Reply::Hang]);
    let mut orchestrator = Orchestrator::builder().provider(provider).build().unwrap();
    let token = CancellationToken::new();

    {
        let mut events = orchestrator.run_stream_with_cancel("hi", token.clone());
        assert_eq!(events.next().await, Some(StreamEvent::Thinking));
    }

    assert!(token.is_cancelled());
}

#[tokio::test]
async fn cancelling_the_token_ends_the_stream() {
    let provider = Scripted::new(vec![Reply::Hang]);
    let mut orchestrator = Orchestrator::builder().provider(provider).build().unwrap();
    let token = CancellationToken::new();

    let mut events = orchestrator.run_stream_with_cancel("hi", token.clone());
    assert_eq!(events.next().await, Some(StreamEvent::Thinking));
    token.cancel();

    assert_eq!(events.next().await, Some(StreamEvent::error(CANCELLED_MESSAGE)));
    assert_eq!(events.next().await, None);
}

#[tokio::test]
async fn completed_stream_leaves_token_alone() {
    let provider = Scripted::new(vec![Reply::chunks(&["Just ", "text."])]);
    let mut orchestrator = Orchestrator::builder().provider(provider).build().unwrap();
    let token = CancellationToken::new();

    let events: Vec<StreamEvent> = orchestrator
        .run_stream_with_cancel("hi", token.clone())
        .collect()
        .await;

    assert_eq!(names(&events), vec!["thinking", "text", "complete"]);
    assert!(!token.is_cancelled());
}
