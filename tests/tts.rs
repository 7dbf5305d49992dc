//! Text-to-speech client tests against a mock endpoint

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dex_voice::Error;
use dex_voice::voice::TextToSpeech;

const MP3_STUB: &[u8] = b"ID3\x03\x00\x00\x00\x00\x00\x00";

#[tokio::test]
async fn test_openai_speech_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "tts-1",
            "voice": "nova",
            "input": "Pikachu is an Electric-type Pokémon."
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_STUB))
        .expect(1)
        .mount(&server)
        .await;

    let tts = TextToSpeech::new_openai("sk-test".to_string(), "alloy".to_string())
        .unwrap()
        .with_base_url(&server.uri());
    let audio = tts
        .synthesize("Pikachu is an Electric-type Pokémon.", Some("nova"), 1.0)
        .await
        .unwrap();

    assert_eq!(audio, MP3_STUB);
}

#[tokio::test]
async fn test_openai_speed_is_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(body_partial_json(serde_json::json!({ "voice": "alloy", "speed": 4.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_STUB))
        .expect(1)
        .mount(&server)
        .await;

    let tts = TextToSpeech::new_openai("sk-test".to_string(), "alloy".to_string())
        .unwrap()
        .with_base_url(&server.uri());

    tokio_test::assert_ok!(tts.synthesize("Snorlax.", None, 10.0).await);
}

#[tokio::test]
async fn test_elevenlabs_speech_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/voice-123"))
        .and(header("xi-api-key", "el-test"))
        .and(body_partial_json(serde_json::json!({
            "text": "Eevee.",
            "model_id": "eleven_monolingual_v1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3_STUB))
        .expect(1)
        .mount(&server)
        .await;

    let tts = TextToSpeech::new_elevenlabs("el-test".to_string(), "voice-123".to_string())
        .unwrap()
        .with_base_url(&server.uri());
    let audio = tts.synthesize("Eevee.", None, 1.0).await.unwrap();

    assert_eq!(audio, MP3_STUB);
}

#[tokio::test]
async fn test_rejected_key_is_a_tts_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let tts = TextToSpeech::new_openai("sk-bad".to_string(), "alloy".to_string())
        .unwrap()
        .with_base_url(&server.uri());

    match tts.synthesize("Mew.", None, 1.0).await {
        Err(Error::Tts(message)) => {
            assert!(message.contains("401"));
            assert!(message.contains("invalid api key"));
        }
        other => panic!("expected TTS error, got {other:?}"),
    }
}
