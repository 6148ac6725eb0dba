//! Deepgram Speak contract tests against a mock HTTP server.

use dineai::config::TtsConfig;
use dineai::traits::SpeechSynthesizer;
use dineai::tts::DeepgramSpeak;
use dineai::SpeechError;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn speaker(server: &MockServer) -> DeepgramSpeak {
    let config = TtsConfig {
        url: format!("{}/v1/speak", server.uri()),
        request_timeout_secs: 5,
        ..TtsConfig::default()
    };
    DeepgramSpeak::new(&config, "dg-key").unwrap()
}

#[tokio::test]
async fn posts_text_and_returns_audio_bytes() {
    let server = MockServer::start().await;
    let audio = vec![0xFF, 0xFB, 0x90, 0x00, 0x01, 0x02];
    Mock::given(method("POST"))
        .and(path("/v1/speak"))
        .and(query_param("model", "aura-helios-en"))
        .and(header("Authorization", "Token dg-key"))
        .and(body_json(json!({"text": "Your table is booked."})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(audio.clone()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bytes = speaker(&server)
        .synthesize("Your table is booked.")
        .await
        .unwrap();
    assert_eq!(bytes, audio);
}

#[tokio::test]
async fn unauthorized_is_tts_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let err = speaker(&server).synthesize("hello").await.unwrap_err();
    assert!(matches!(&err, SpeechError::Tts(m) if m.contains("401")));
}

#[tokio::test]
async fn empty_audio_is_tts_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = speaker(&server).synthesize("hello").await.unwrap_err();
    assert!(matches!(err, SpeechError::Tts(_)));
}
