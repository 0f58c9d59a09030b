// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inference manager behaviour over mock backends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use edgerag_core::types::{BackendState, MultimodalStage, RawImage};
use edgerag_test_utils::{
    BackendEvent, CollectingSink, Convention, FaultKind, MockBackendFactory, TestHarness,
};
use tokio_util::sync::CancellationToken;

const CORPUS: [&str; 4] = [
    "The fire extinguisher is in the kitchen under the sink.",
    "Bananas ripen quickly at room temperature.",
    "My dentist appointment moved to Tuesday.",
    "Wifi password: correct horse battery staple",
];

async fn harness(factory: MockBackendFactory) -> TestHarness {
    TestHarness::builder()
        .with_chunks(CORPUS)
        .with_factory(factory)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn retrieved_fact_is_first_in_context() {
    let factory = MockBackendFactory::new().with_text_responses(["Under the sink."]);
    let h = harness(factory.clone()).await;

    let answer = h.ask("Where is the fire extinguisher?").await;

    assert_eq!(answer, "Under the sink.");
    let prompt = &factory.prompts()[0];
    assert!(prompt.contains("remember: The fire extinguisher is in the kitchen under the sink."));
    assert!(prompt.ends_with("question the user has: Where is the fire extinguisher?"));
    assert_eq!(h.manager.status().completed, 1);
}

#[tokio::test]
async fn concurrent_requests_run_one_at_a_time_in_arrival_order() {
    let factory = MockBackendFactory::new()
        .with_text_responses(["first answer is long", "second answer"])
        .with_chunk_delay(Duration::from_millis(10));
    let h = Arc::new(harness(factory.clone()).await);
    let log: Arc<Mutex<Vec<char>>> = Arc::default();

    let (h1, log1) = (Arc::clone(&h), Arc::clone(&log));
    let first = tokio::spawn(async move {
        let sink = move |_: &str, _: bool| log1.lock().unwrap().push('a');
        h1.manager.generate("question one", &sink).await
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (h2, log2) = (Arc::clone(&h), Arc::clone(&log));
    let second = tokio::spawn(async move {
        let sink = move |_: &str, _: bool| log2.lock().unwrap().push('b');
        h2.manager.generate("question two", &sink).await
    });

    assert_eq!(first.await.unwrap(), "first answer is long");
    assert_eq!(second.await.unwrap(), "second answer");

    let log = log.lock().unwrap().clone();
    let first_b = log.iter().position(|c| *c == 'b').unwrap();
    assert!(log[..first_b].iter().all(|c| *c == 'a'));
    assert!(log[first_b..].iter().all(|c| *c == 'b'));

    let prompts = factory.prompts();
    assert!(prompts[0].ends_with("question one"));
    assert!(prompts[1].ends_with("question two"));
}

#[tokio::test(start_paused = true)]
async fn state_is_busy_during_generation() {
    let factory = MockBackendFactory::new()
        .with_text_responses(["a b c"])
        .with_chunk_delay(Duration::from_millis(10));
    let h = Arc::new(harness(factory).await);
    assert_eq!(h.manager.state(), BackendState::Ready);

    let h1 = Arc::clone(&h);
    let task = tokio::spawn(async move { h1.ask("q").await });
    tokio::time::sleep(Duration::from_millis(15)).await;
    assert_eq!(h.manager.state(), BackendState::Busy);

    task.await.unwrap();
    assert_eq!(h.manager.state(), BackendState::Ready);
}

#[tokio::test]
async fn image_request_swaps_backends_in_order() {
    let factory = MockBackendFactory::new().with_image_responses(["A red fire extinguisher."]);
    let h = harness(factory.clone()).await;
    let sink = CollectingSink::new();

    let answer = h
        .manager
        .generate_with_image(
            "What is this next to the fire extinguisher?",
            &TestHarness::sample_image(),
            &sink,
        )
        .await;

    assert_eq!(answer, "A red fire extinguisher.");
    assert_eq!(sink.final_text().as_deref(), Some("A red fire extinguisher."));
    assert!(sink.is_monotonic());

    let events = factory.events();
    let query = events
        .iter()
        .find_map(|e| match e {
            BackendEvent::QueryAdded(q) => Some(q.clone()),
            _ => None,
        })
        .unwrap();
    assert!(query.contains("The fire extinguisher is in the kitchen under the sink."));
    assert!(query.contains(
        "Please analyze the image I've provided and answer this question: \
         What is this next to the fire extinguisher?"
    ));

    assert_eq!(
        events,
        vec![
            BackendEvent::TextLoaded,
            BackendEvent::TextReleased,
            BackendEvent::MultimodalCreated,
            BackendEvent::SessionCreated,
            BackendEvent::ImageAdded,
            BackendEvent::QueryAdded(query),
            BackendEvent::MultimodalGenerate,
            BackendEvent::SessionClosed,
            BackendEvent::MultimodalClosed,
            BackendEvent::TextLoaded,
        ]
    );
    assert_eq!(factory.max_resident(), 1);
    assert_eq!(factory.resident(), 1);
    assert_eq!(h.manager.state(), BackendState::Ready);
    assert_eq!(h.manager.status().fallbacks, 0);
}

#[tokio::test]
async fn every_multimodal_failure_falls_back_to_the_text_answer() {
    let stages = [
        (MultimodalStage::OptionsBuild, FaultKind::Error),
        (MultimodalStage::BackendCreation, FaultKind::OutOfMemory),
        (MultimodalStage::BackendCreation, FaultKind::Error),
        (MultimodalStage::SessionOptionsBuild, FaultKind::Error),
        (MultimodalStage::SessionCreation, FaultKind::Error),
        (MultimodalStage::Input, FaultKind::Error),
        (MultimodalStage::Generation, FaultKind::Error),
        (MultimodalStage::Generation, FaultKind::MidStream),
    ];

    for (stage, kind) in stages {
        let factory = MockBackendFactory::new()
            .with_text_responses(["text answer", "text answer"])
            .with_fault(stage, kind);
        let h = harness(factory.clone()).await;

        let with_image = h
            .ask_with_image("Where is the fire extinguisher?", &TestHarness::sample_image())
            .await;
        let plain = h.ask("Where is the fire extinguisher?").await;

        assert_eq!(with_image, plain, "stage {stage}");
        assert_eq!(with_image, "text answer", "stage {stage}");
        let prompts = factory.prompts();
        assert_eq!(prompts[0], prompts[1], "stage {stage}");

        assert_eq!(h.manager.state(), BackendState::Ready, "stage {stage}");
        assert_eq!(h.manager.status().fallbacks, 1, "stage {stage}");
        assert_eq!(factory.max_resident(), 1, "stage {stage}");
        assert_eq!(factory.resident(), 1, "stage {stage}");
        assert_eq!(
            factory.count(&BackendEvent::MultimodalCreated),
            factory.count(&BackendEvent::MultimodalClosed),
            "stage {stage}"
        );
        assert_eq!(
            factory.count(&BackendEvent::SessionCreated),
            factory.count(&BackendEvent::SessionClosed),
            "stage {stage}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn hung_construction_times_out_and_falls_back() {
    for stage in [MultimodalStage::BackendCreation, MultimodalStage::SessionCreation] {
        let factory = MockBackendFactory::new()
            .with_text_responses(["text answer"])
            .with_fault(stage, FaultKind::Hang);
        let h = TestHarness::builder()
            .with_chunks(CORPUS)
            .with_factory(factory.clone())
            .with_config(|c| c.multimodal.construction_timeout_secs = 1)
            .build()
            .await
            .unwrap();

        let answer = h.ask_with_image("q", &TestHarness::sample_image()).await;

        assert_eq!(answer, "text answer");
        assert_eq!(h.manager.state(), BackendState::Ready);
        assert_eq!(factory.resident(), 1, "stage {stage}");
        assert_eq!(
            factory.count(&BackendEvent::MultimodalCreated),
            factory.count(&BackendEvent::MultimodalClosed),
            "stage {stage}"
        );
    }
}

#[tokio::test]
async fn empty_image_falls_back_without_releasing() {
    let factory = MockBackendFactory::new().with_text_responses(["text answer"]);
    let h = harness(factory.clone()).await;

    let answer = h
        .ask_with_image("q", &RawImage::new(Vec::new(), "image/png"))
        .await;

    assert_eq!(answer, "text answer");
    assert_eq!(factory.count(&BackendEvent::TextReleased), 0);
    assert_eq!(factory.count(&BackendEvent::MultimodalCreated), 0);
    assert_eq!(h.manager.status().fallbacks, 1);
}

#[tokio::test]
async fn disabled_multimodal_answers_from_text() {
    let factory = MockBackendFactory::new().with_text_responses(["text answer"]);
    let h = TestHarness::builder()
        .with_factory(factory.clone())
        .with_config(|c| c.multimodal.enabled = false)
        .build()
        .await
        .unwrap();

    assert_eq!(h.ask_with_image("q", &TestHarness::sample_image()).await, "text answer");
    assert_eq!(factory.count(&BackendEvent::MultimodalCreated), 0);
    assert_eq!(h.manager.status().fallbacks, 0);
}

#[tokio::test]
async fn failed_load_rejects_without_retrying_until_reinitialized() {
    let factory = MockBackendFactory::new().with_load_failures(1);
    let h = harness(factory.clone()).await;
    assert!(h.manager.state().is_failed());

    let first = h.ask("q").await;
    let second = h.ask("q").await;
    assert!(first.contains("failed to initialize"), "{first}");
    assert_eq!(first, second);
    assert!(factory.prompts().is_empty());
    assert_eq!(factory.count(&BackendEvent::TextLoaded), 0);

    h.manager.reinitialize().await.unwrap();
    assert_eq!(h.manager.state(), BackendState::Ready);
    assert_eq!(h.ask("q").await, "mock response");
}

#[tokio::test]
async fn failed_restore_after_image_request_marks_backend_failed() {
    let factory = MockBackendFactory::new().with_image_responses(["a cat on a mat"]);
    let h = harness(factory.clone()).await;
    factory.set_load_failures(1);

    let answer = h.ask_with_image("q", &TestHarness::sample_image()).await;

    assert_eq!(answer, "a cat on a mat");
    assert!(h.manager.state().is_failed());
    assert!(h.ask("q").await.contains("failed to initialize"));
    h.manager.reinitialize().await.unwrap();
    assert_eq!(h.manager.state(), BackendState::Ready);
}

#[tokio::test]
async fn released_backend_reloads_on_next_request() {
    let factory = MockBackendFactory::new();
    let h = harness(factory.clone()).await;

    h.manager.release().await;
    assert_eq!(h.manager.state(), BackendState::Uninitialized);
    assert!(!h.manager.status().backend_loaded);
    assert_eq!(factory.resident(), 0);

    assert_eq!(h.ask("q").await, "mock response");
    assert_eq!(factory.count(&BackendEvent::TextLoaded), 2);
    assert_eq!(h.manager.state(), BackendState::Ready);
}

#[tokio::test]
async fn lazy_manager_loads_on_first_request() {
    let factory = MockBackendFactory::new();
    let h = TestHarness::builder()
        .with_factory(factory.clone())
        .lazy()
        .build()
        .await
        .unwrap();
    assert_eq!(h.manager.state(), BackendState::Initializing);
    assert_eq!(factory.resident(), 0);

    h.ask("q").await;
    assert_eq!(factory.count(&BackendEvent::TextLoaded), 1);
}

#[tokio::test]
async fn translation_skips_retrieval() {
    let factory = MockBackendFactory::new().with_text_responses(["Bonjour"]);
    let h = harness(factory.clone()).await;
    let embedded = h.embedder.calls();

    let answer = h.translate("Good morning", "French").await;

    assert_eq!(answer, "Bonjour");
    assert_eq!(h.embedder.calls(), embedded);
    assert_eq!(
        factory.prompts()[0],
        "Translate the following text to French. Provide only the translation without any \
         additional explanation or commentary.\n\nText to translate: \"Good morning\"\n\nTranslation:"
    );
}

#[tokio::test]
async fn translation_errors_are_reported_inline() {
    let factory = MockBackendFactory::new();
    let h = harness(factory.clone()).await;
    factory.set_fail_generation(true);

    let sink = CollectingSink::new();
    let answer = h.manager.translate("Good morning", "French", &sink).await;
    assert!(answer.starts_with("Translation failed: "), "{answer}");
    assert_eq!(sink.final_text().as_deref(), Some(answer.as_str()));
    assert_eq!(sink.done_count(), 1);
}

#[tokio::test]
async fn generation_errors_become_a_message() {
    let factory = MockBackendFactory::new();
    let h = harness(factory.clone()).await;
    factory.set_fail_generation(true);

    let sink = CollectingSink::new();
    let answer = h.manager.generate("q", &sink).await;
    assert!(answer.starts_with("Sorry"), "{answer}");
    assert_eq!(sink.calls(), vec![(answer.clone(), true)]);
    assert_eq!(h.manager.state(), BackendState::Ready);
    assert_eq!(h.manager.status().completed, 0);
}

#[tokio::test]
async fn broken_text_stream_ends_with_the_message() {
    let factory = MockBackendFactory::new()
        .with_text_responses(["one two three four"])
        .with_text_stream_break(2);
    let h = harness(factory).await;
    let sink = CollectingSink::new();

    let answer = h.manager.generate("q", &sink).await;

    assert!(answer.starts_with("Sorry, I couldn't generate a response: "), "{answer}");
    assert_eq!(
        sink.calls(),
        vec![
            ("one".to_string(), false),
            ("one two".to_string(), false),
            (answer.clone(), true),
        ]
    );
    assert_eq!(h.manager.state(), BackendState::Ready);
}

#[tokio::test]
async fn failed_backend_message_reaches_the_sink() {
    let h = harness(MockBackendFactory::new().with_load_failures(1)).await;
    assert!(h.manager.state().is_failed());

    for image in [None, Some(TestHarness::sample_image())] {
        let sink = CollectingSink::new();
        let answer = match &image {
            None => h.manager.generate("q", &sink).await,
            Some(image) => h.manager.generate_with_image("q", image, &sink).await,
        };
        assert!(answer.starts_with("Sorry"), "{answer}");
        assert_eq!(sink.final_text().as_deref(), Some(answer.as_str()));
        assert_eq!(sink.done_count(), 1);
    }
}

#[tokio::test]
async fn image_stream_breaking_part_way_never_shrinks_visible_text() {
    let factory = MockBackendFactory::new()
        .with_image_responses(["The image shows a long thing"])
        .with_text_responses(["Text answer here"])
        .with_fault(MultimodalStage::Generation, FaultKind::MidStream);
    let h = harness(factory.clone()).await;
    let sink = CollectingSink::new();

    let answer = h
        .manager
        .generate_with_image("What is this?", &TestHarness::sample_image(), &sink)
        .await;

    assert_eq!(answer, "Text answer here");
    assert!(sink.is_monotonic(), "{:?}", sink.calls());
    assert_eq!(sink.done_count(), 1);
    assert_eq!(sink.final_text().as_deref(), Some("Text answer here"));
    assert!(sink.calls().iter().all(|(text, _)| !text.contains("image shows")));
    assert_eq!(factory.count(&BackendEvent::MultimodalGenerate), 1);
    assert_eq!(h.manager.status().fallbacks, 1);
    assert_eq!(h.manager.state(), BackendState::Ready);
}

#[tokio::test]
async fn image_answer_arrives_once_complete() {
    let factory = MockBackendFactory::new().with_image_responses(["A red fire extinguisher."]);
    let h = harness(factory).await;
    let sink = CollectingSink::new();

    h.manager
        .generate_with_image("What is this?", &TestHarness::sample_image(), &sink)
        .await;

    assert_eq!(
        sink.calls(),
        vec![("A red fire extinguisher.".to_string(), true)]
    );
}

#[tokio::test]
async fn conventions_produce_the_same_visible_text() {
    let mut finals = Vec::new();
    for convention in [Convention::Delta, Convention::Cumulative] {
        let factory = MockBackendFactory::new()
            .with_text_responses(["  The extinguisher  is red. "])
            .with_conventions(convention, convention);
        let h = harness(factory).await;
        let sink = CollectingSink::new();

        let answer = h.manager.generate("q", &sink).await;

        assert!(sink.is_monotonic());
        assert_eq!(sink.done_count(), 1);
        assert_eq!(sink.final_text().as_deref(), Some(answer.as_str()));
        finals.push((answer, sink.calls()));
    }
    assert_eq!(finals[0], finals[1]);
    assert_eq!(finals[0].0, "The extinguisher  is red.");
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_partial_text() {
    let factory = MockBackendFactory::new()
        .with_text_responses(["one two three four five six"])
        .with_chunk_delay(Duration::from_millis(20));
    let h = harness(factory).await;
    let sink = CollectingSink::new();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let partial = h.manager.generate_with_cancel("q", &sink, &cancel).await;

    assert_eq!(partial, "one two");
    assert_eq!(sink.done_count(), 1);
    assert_eq!(h.manager.state(), BackendState::Ready);
    assert_eq!(h.manager.status().completed, 0);
    assert_eq!(h.ask("q").await, "mock response");
}

#[tokio::test]
async fn cancelled_while_queued_never_reaches_the_backend() {
    let factory = MockBackendFactory::new();
    let h = harness(factory.clone()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let sink = CollectingSink::new();
    let answer = h.manager.generate_with_cancel("q", &sink, &cancel).await;

    assert_eq!(answer, "");
    assert_eq!(sink.calls(), vec![(String::new(), true)]);
    assert!(factory.prompts().is_empty());
}
