use journal_reflect::backends::http::HttpEndpoint;
use journal_reflect::backends::storage::HttpObjectStorage;
use journal_reflect::backends::{
    AffirmationRequest, AffirmationService, MoodRequest, MoodService, ObjectStorage, SpeechOutput,
    SpeechRequest, SpeechSynthesizer,
};
use journal_reflect::ServiceError;
use mockito::Matcher;
use std::time::Duration;

fn mood_request(entry: &str) -> MoodRequest {
    MoodRequest {
        entry: entry.to_string(),
        name: None,
    }
}

fn speech_request(text: &str) -> SpeechRequest {
    SpeechRequest {
        text: text.to_string(),
        voice_settings: None,
        save_to_storage: Some(false),
        owner_id: None,
    }
}

#[tokio::test]
async fn test_mood_endpoint_sends_key_and_parses_reply() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/analyze-mood")
        .match_header("authorization", "Bearer secret")
        .match_header("apikey", "secret")
        .match_body(Matcher::PartialJson(serde_json::json!({ "entry": "Lovely picnic" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true,"mood":"good","confidence":0.8,"analysis":"Warm day out."}"#)
        .create_async()
        .await;

    let url = format!("{}/analyze-mood", server.url());
    let endpoint = HttpEndpoint::new(url, Some("secret".into()));
    let reply = endpoint.analyze(&mood_request("Lovely picnic")).await.unwrap();

    assert_eq!(reply.mood.as_deref(), Some("good"));
    assert_eq!(reply.confidence, Some(0.8));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_errors_keep_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/analyze-mood")
        .with_status(403)
        .with_body("origin not allowed")
        .create_async()
        .await;

    let endpoint = HttpEndpoint::new(format!("{}/analyze-mood", server.url()), None);
    let err = endpoint.analyze(&mood_request("x")).await.unwrap_err();

    assert_eq!(
        err,
        ServiceError::Http {
            status: 403,
            message: "origin not allowed".into()
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_reported_failure_is_invalid_response() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/generate-affirmation")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":false,"error":"model overloaded"}"#)
        .create_async()
        .await;

    let endpoint = HttpEndpoint::new(format!("{}/generate-affirmation", server.url()), None);
    let err = endpoint
        .generate(&AffirmationRequest {
            entry: "text".into(),
            mood: "low".into(),
            name: None,
            instruction: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err, ServiceError::InvalidResponse("model overloaded".into()));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_speech_raw_bytes() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/text-to-speech")
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body(vec![0xFF, 0xFB, 0x90, 0x00])
        .create_async()
        .await;

    let endpoint = HttpEndpoint::new(format!("{}/text-to-speech", server.url()), None);
    let output = endpoint.synthesize(&speech_request("Hello")).await.unwrap();
    assert_eq!(output, SpeechOutput::Audio(vec![0xFF, 0xFB, 0x90, 0x00]));
}

#[tokio::test]
async fn test_speech_stored_url_reply() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/text-to-speech")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true,"audio_url":"https://cdn.example/a.mp3"}"#)
        .create_async()
        .await;

    let endpoint = HttpEndpoint::new(format!("{}/text-to-speech", server.url()), None);
    let output = endpoint.synthesize(&speech_request("Hello")).await.unwrap();
    assert_eq!(
        output,
        SpeechOutput::Stored {
            audio_url: "https://cdn.example/a.mp3".into()
        }
    );
}

#[tokio::test]
async fn test_storage_upload_and_sign() {
    let mut server = mockito::Server::new_async().await;
    let upload = server
        .mock("POST", "/object/affirmation-audio/owner-1/1700000000000_affirmation")
        .match_header("content-type", "audio/mpeg")
        .match_header("x-upsert", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"Key":"affirmation-audio/owner-1/1700000000000_affirmation"}"#)
        .create_async()
        .await;
    let sign = server
        .mock("POST", "/object/sign/affirmation-audio/owner-1/1700000000000_affirmation")
        .match_body(Matcher::Json(serde_json::json!({ "expiresIn": 3600 })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"signedURL":"/object/sign/affirmation-audio/owner-1/1700000000000_affirmation?token=abc"}"#,
        )
        .create_async()
        .await;

    let storage = HttpObjectStorage::new(server.url(), "affirmation-audio", Some("k".into()));
    let path = storage
        .put("owner-1/1700000000000_affirmation", vec![1, 2, 3], "audio/mpeg")
        .await
        .unwrap();
    assert_eq!(path, "owner-1/1700000000000_affirmation");

    let url = storage
        .create_signed_url(&path, Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(
        url,
        format!(
            "{}/object/sign/affirmation-audio/owner-1/1700000000000_affirmation?token=abc",
            server.url()
        )
    );

    upload.assert_async().await;
    sign.assert_async().await;
}

#[tokio::test]
async fn test_storage_write_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", Matcher::Regex(r"^/object/affirmation-audio/.*".into()))
        .with_status(507)
        .with_body("quota")
        .create_async()
        .await;

    let storage = HttpObjectStorage::new(server.url(), "affirmation-audio", None);
    let err = storage
        .put("owner-1/1_affirmation", vec![0], "audio/mpeg")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Http { status: 507, .. }));
}

#[tokio::test]
async fn test_client_timeout_reports_transport_timeout() {
    // Accepts connections and never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _held = tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let endpoint = HttpEndpoint::with_client(client, format!("http://{}/analyze-mood", addr), None);
    let err = endpoint.analyze(&mood_request("x")).await.unwrap_err();

    assert!(matches!(err, ServiceError::TransportTimeout(_)), "got {:?}", err);
    assert!(err.is_retryable());
    assert!(!err.to_string().contains("0ns"));
}
