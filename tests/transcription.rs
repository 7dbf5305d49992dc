//! Transcription client tests against a mock endpoint

use std::sync::Arc;

use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dex_voice::voice::{SERVICE_TRANSCRIPTION_PATH, SpeechToText, samples_to_wav};
use dex_voice::{
    AudioFocus, CaptureSettings, CaptureState, Error, RecordedClip, Transcriber, VoiceCapture,
};

mod common;

use common::{FakeMicrophone, Results, states_until};

fn clip() -> RecordedClip {
    let samples = vec![0.0_f32; 1600];
    RecordedClip {
        bytes: samples_to_wav(&samples, 16000).unwrap(),
        file_name: "recording.wav".to_string(),
        mime_type: "audio/wav".to_string(),
    }
}

#[tokio::test]
async fn test_service_transcription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SERVICE_TRANSCRIPTION_PATH))
        .and(body_string_contains("name=\"data\""))
        .and(body_string_contains("filename=\"recording.wav\""))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "transcript": "pikachu" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stt = SpeechToText::new_service(&server.uri()).unwrap();
    let transcript = tokio_test::assert_ok!(stt.transcribe(clip()).await);

    assert_eq!(transcript, "pikachu");
}

#[tokio::test]
async fn test_whisper_transcription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_string_contains("name=\"model\""))
        .and(body_string_contains("whisper-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "Charmander" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stt = SpeechToText::new_whisper("sk-test".to_string(), "whisper-1".to_string())
        .unwrap()
        .with_base_url(&server.uri());
    let transcript = stt.transcribe(clip()).await.unwrap();

    assert_eq!(transcript, "Charmander");
}

#[tokio::test]
async fn test_service_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SERVICE_TRANSCRIPTION_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("model offline"))
        .mount(&server)
        .await;

    let stt = SpeechToText::new_service(&server.uri()).unwrap();
    let err = stt.transcribe(clip()).await.unwrap_err();

    match err {
        Error::Stt(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("model offline"));
        }
        other => panic!("expected STT error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_response_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SERVICE_TRANSCRIPTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let stt = SpeechToText::new_service(&server.uri()).unwrap();

    assert!(matches!(stt.transcribe(clip()).await, Err(Error::Http(_))));
}

#[tokio::test]
async fn test_capture_through_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SERVICE_TRANSCRIPTION_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "transcript": "  Bulbasaur \n" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let microphone = Arc::new(FakeMicrophone::new());
    let results = Results::new();
    let capture = VoiceCapture::new(
        Arc::clone(&microphone) as _,
        Arc::new(SpeechToText::new_service(&server.uri()).unwrap()),
        AudioFocus::new(),
        CaptureSettings {
            auto_submit: false,
            ..CaptureSettings::default()
        },
        results.callback(),
    );
    let mut transitions = capture.transitions();

    capture.start_listening().await;
    capture.stop_listening();

    let states = states_until(&mut transitions, CaptureState::Idle).await;
    assert_eq!(
        states,
        vec![
            CaptureState::Listening,
            CaptureState::Processing,
            CaptureState::Idle
        ]
    );
    assert_eq!(capture.snapshot().transcript.as_deref(), Some("Bulbasaur"));
    assert!(capture.snapshot().error.is_none());
    assert_eq!(results.taken(), vec![("Bulbasaur".to_string(), false)]);
    assert_eq!(microphone.releases(), 1);
}
