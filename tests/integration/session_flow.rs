//! End-to-end conversation scenarios against in-process collaborators.

use crate::helpers::{
    FakeGenerator, Harness, Scripted, TextSpeaker, TextSynth, test_config, texts,
};
use dineai::pipeline::messages::{Role, TranscriptEvent, TransportEvent};
use dineai::pipeline::state::SessionState;
use dineai::{AgentConfig, RuntimeEvent};
use std::time::Duration;

fn defaults() -> AgentConfig {
    AgentConfig::default()
}

#[tokio::test]
async fn bbq_order_is_answered_and_spoken() {
    let generator = FakeGenerator::new().on(
        "I'd like two BBQ chicken orders",
        Scripted::Text("Two BBQ Chicken at $7.75 each, $15.50 total.".into()),
    );
    let mut h = Harness::start(
        generator.clone(),
        TextSynth::default(),
        TextSpeaker::new(Duration::from_millis(5)),
    );
    h.wait_welcome_done().await;

    h.transport
        .push(TransportEvent::Transcript(TranscriptEvent::finalized(
            "I'd like two",
        )))
        .await;
    h.transport
        .push(TransportEvent::Transcript(TranscriptEvent::interim("BBQ chick")))
        .await;
    h.transport
        .push(TransportEvent::Transcript(TranscriptEvent::speech_final(
            "BBQ chicken orders",
        )))
        .await;
    h.wait_replies_played(1).await;
    assert!(!h.handle.is_speaking());

    h.handle.interrupt();
    let speaker = h.speaker.clone();
    let handle = h.handle.clone();
    let summary = h.finish().await;

    assert_eq!(
        texts(&summary.turns),
        vec![
            (Role::Assistant, defaults().conversation.welcome_text),
            (Role::User, "I'd like two BBQ chicken orders".into()),
            (
                Role::Assistant,
                "Two BBQ Chicken at $7.75 each, $15.50 total.".into()
            ),
        ]
    );
    let history = &generator.histories()[0];
    assert_eq!(history.len(), 2, "welcome plus the new user turn");
    assert_eq!(
        speaker.played(),
        vec![
            defaults().conversation.welcome_text,
            "Two BBQ Chicken at $7.75 each, $15.50 total.".into()
        ]
    );
    assert_eq!(handle.state(), SessionState::Ended);
    assert!(handle.ledger().is_sealed());
}

#[tokio::test]
async fn goodbye_plays_farewell_and_ends_session() {
    let generator = FakeGenerator::new();
    let mut h = Harness::start(
        generator.clone(),
        TextSynth::default(),
        TextSpeaker::new(Duration::from_millis(5)),
    );
    h.wait_welcome_done().await;

    h.transport.say("ok thanks, goodbye").await;
    h.wait_for(|e| *e == RuntimeEvent::SessionState(SessionState::Ended))
        .await;

    let speaker = h.speaker.clone();
    let transport = h.transport.clone();
    let microphone = h.microphone.clone();
    let summary = h.finish().await;

    assert_eq!(summary.turns.len(), 1, "only the welcome turn is recorded");
    assert!(generator.histories().is_empty());
    assert_eq!(
        speaker.played(),
        vec![
            defaults().conversation.welcome_text,
            defaults().conversation.farewell_text
        ]
    );
    assert_eq!(summary.playback.played, 2);
    assert!(transport.is_stopped());
    assert!(microphone.is_finished());
}

#[tokio::test]
async fn synthesis_failure_keeps_text_turn_and_keeps_listening() {
    let generator = FakeGenerator::new().on(
        "what is the special today",
        Scripted::Text("UNSAYABLE special".into()),
    );
    let mut h = Harness::start(
        generator,
        TextSynth::failing_containing("UNSAYABLE"),
        TextSpeaker::new(Duration::from_millis(5)),
    );
    h.wait_welcome_done().await;

    h.transport.say("what is the special today").await;
    h.wait_for(|e| matches!(e, RuntimeEvent::AssistantReply(r) if r == "UNSAYABLE special"))
        .await;
    assert_eq!(h.handle.state(), SessionState::Active);

    h.transport.say("a table for two please").await;
    h.wait_replies_played(1).await;

    h.handle.interrupt();
    let speaker = h.speaker.clone();
    let summary = h.finish().await;

    let roles: Vec<Role> = summary.turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );
    assert_eq!(summary.turns[2].text, "UNSAYABLE special");
    assert_eq!(
        speaker.played()[1..],
        ["re: a table for two please".to_owned()]
    );
}

#[tokio::test]
async fn generation_failure_speaks_fallback() {
    let generator = FakeGenerator::new().on("a table at seven", Scripted::Fail);
    let mut h = Harness::start(
        generator,
        TextSynth::default(),
        TextSpeaker::new(Duration::from_millis(5)),
    );
    h.wait_welcome_done().await;

    h.transport.say("a table at seven").await;
    h.wait_replies_played(1).await;
    h.handle.interrupt();
    let speaker = h.speaker.clone();
    let summary = h.finish().await;

    let fallback = defaults().conversation.fallback_text;
    assert_eq!(summary.turns.last().unwrap().text, fallback);
    assert_eq!(speaker.played().last().unwrap(), &fallback);
}

#[tokio::test]
async fn speech_heard_while_speaking_is_discarded() {
    let mut h = Harness::start(
        FakeGenerator::new(),
        TextSynth::default(),
        TextSpeaker::new(Duration::from_millis(250)),
    );
    h.wait_for(
        |e| matches!(e, RuntimeEvent::AssistantSpeechStart { job_id } if job_id == "welcome"),
    )
    .await;
    assert!(h.handle.is_speaking());
    h.transport.say("hello welcome to dine A I").await;

    h.wait_welcome_done().await;
    h.transport.say("a table for two please").await;
    h.wait_replies_played(1).await;

    h.handle.interrupt();
    let summary = h.finish().await;
    let users: Vec<String> = summary
        .turns
        .iter()
        .filter(|t| t.role == Role::User)
        .map(|t| t.text.clone())
        .collect();
    assert_eq!(users, vec!["a table for two please"]);
}

#[tokio::test]
async fn rapid_utterances_are_answered_in_order() {
    let generator = FakeGenerator::new()
        .on(
            "first question",
            Scripted::Slow(Duration::from_millis(200), "first answer".into()),
        )
        .on("second question", Scripted::Text("second answer".into()));
    let mut h = Harness::start(
        generator,
        TextSynth::default(),
        TextSpeaker::new(Duration::from_millis(5)),
    );
    h.wait_welcome_done().await;

    h.transport.say("first question").await;
    h.transport.say("second question").await;
    h.wait_replies_played(2).await;

    h.handle.interrupt();
    let speaker = h.speaker.clone();
    let summary = h.finish().await;

    let assistant: Vec<String> = summary
        .turns
        .iter()
        .skip(1)
        .filter(|t| t.role == Role::Assistant)
        .map(|t| t.text.clone())
        .collect();
    assert_eq!(assistant, vec!["first answer", "second answer"]);
    assert_eq!(speaker.played()[1..], ["first answer", "second answer"]);
}

#[tokio::test]
async fn relaxed_order_lets_fast_reply_overtake() {
    let mut config = test_config();
    config.conversation.strict_reply_order = false;
    let generator = FakeGenerator::new()
        .on(
            "first question",
            Scripted::Slow(Duration::from_millis(200), "first answer".into()),
        )
        .on("second question", Scripted::Text("second answer".into()));
    let mut h = Harness::start_with(
        config,
        generator,
        TextSynth::default(),
        TextSpeaker::new(Duration::from_millis(5)),
    );
    h.wait_welcome_done().await;

    h.transport.say("first question").await;
    h.transport.say("second question").await;
    h.wait_replies_played(2).await;

    h.handle.interrupt();
    let speaker = h.speaker.clone();
    h.finish().await;
    assert_eq!(speaker.played()[1..], ["second answer", "first answer"]);
}

#[tokio::test]
async fn interrupt_abandons_pending_reply() {
    let generator = FakeGenerator::new().on(
        "slow question",
        Scripted::Slow(Duration::from_millis(200), "too late".into()),
    );
    let mut h = Harness::start(
        generator,
        TextSynth::default(),
        TextSpeaker::new(Duration::from_millis(5)),
    );
    h.wait_welcome_done().await;

    h.transport.say("slow question").await;
    h.wait_for(|e| matches!(e, RuntimeEvent::UserUtterance(_)))
        .await;
    assert!(h.handle.interrupt());

    let speaker = h.speaker.clone();
    let summary = h.finish().await;
    assert_eq!(summary.turns.len(), 2);
    assert_eq!(summary.turns[1].text, "slow question");
    assert_eq!(speaker.played().len(), 1, "only the welcome played");
}

#[tokio::test]
async fn transport_error_does_not_end_session() {
    let mut h = Harness::start(
        FakeGenerator::new(),
        TextSynth::default(),
        TextSpeaker::new(Duration::from_millis(5)),
    );
    h.wait_welcome_done().await;
    h.transport
        .push(TransportEvent::Error("read error: connection reset".into()))
        .await;
    h.wait_for(|e| matches!(e, RuntimeEvent::TransportError(_)))
        .await;

    h.transport.say("a table for two please").await;
    h.wait_replies_played(1).await;
    assert_eq!(h.handle.state(), SessionState::Active);

    h.handle.interrupt();
    let summary = h.finish().await;
    assert_eq!(summary.turns.len(), 3);
}
