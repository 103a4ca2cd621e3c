use posture_coach_lib::analysis::{AnalysisClient, AnalysisError, AnalysisService, Mode};
use posture_coach_lib::capture::controller::PREFERRED_MIME_TYPE;
use posture_coach_lib::capture::{CaptureController, VirtualCamera};
use posture_coach_lib::config::ClientConfig;
use posture_coach_lib::media::SourceMedia;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> AnalysisClient {
    AnalysisClient::new(ClientConfig::new(server.uri())).unwrap()
}

fn video_file() -> (tempfile::TempDir, SourceMedia) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("squat.mp4");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"not really an mp4").unwrap();
    let media = SourceMedia::from_path(&path);
    (dir, media)
}

#[tokio::test]
async fn upload_returns_full_timeline_and_rep_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_string_contains("name=\"mode\""))
        .and(body_string_contains("squat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {
                "frames": [
                    {"frame": 0, "feedback": ["Good posture"]},
                    {"frame": 1, "feedback": ["Leaning forward"]}
                ],
                "rep_count": 1
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, media) = video_file();
    let batch = client(&server)
        .analyze_batch(Some(&media), Mode::Squat)
        .await
        .unwrap();

    assert_eq!(batch.rep_count, 1);
    assert_eq!(batch.frames.len(), 2);
    assert_eq!(batch.frames[1].messages, vec!["Leaning forward".to_string()]);
}

#[tokio::test]
async fn webcam_recording_uploads_with_plain_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_string_contains("filename=\"webcam_recording.webm\""))
        .and(body_string_contains("video/webm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {"frames": [{"frame": 0, "feedback": []}], "rep_count": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut capture = CaptureController::new(Arc::new(VirtualCamera::new()));
    let session = capture.acquire().await.unwrap();
    let handle = capture.start_recording(&session).await.unwrap();
    let outcome = capture.stop_recording(handle).await.unwrap();
    assert_eq!(outcome.artifact.mime_type, PREFERRED_MIME_TYPE);

    let media = SourceMedia::from_artifact(&outcome.artifact);
    let batch = client(&server)
        .analyze_batch(Some(&media), Mode::Squat)
        .await
        .unwrap();
    assert_eq!(batch.frames.len(), 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(!body.contains("codecs="));
}

#[tokio::test]
async fn upload_without_media_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .analyze_batch(None, Mode::Squat)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::NoMedia));
    assert_eq!(err.to_string(), "Please select or record a video file.");
}

#[tokio::test]
async fn malformed_upload_body_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let (_dir, media) = video_file();
    let err = client(&server)
        .analyze_batch(Some(&media), Mode::Pushup)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PROTOCOL_ERROR");
    assert_eq!(
        err.to_string(),
        "Server returned invalid JSON or empty response."
    );
}

#[tokio::test]
async fn service_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "No file uploaded"})))
        .mount(&server)
        .await;

    let (_dir, media) = video_file();
    let err = client(&server)
        .analyze_batch(Some(&media), Mode::Desk)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Service { status: 400, .. }));
    assert_eq!(err.to_string(), "No file uploaded");
}

#[tokio::test]
async fn analyze_frame_posts_base64_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze_frame"))
        .and(body_json(json!({"image": "aGVsbG8="})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"feedback": ["Knee too far forward"]})))
        .expect(1)
        .mount(&server)
        .await;

    let messages = client(&server).analyze_frame("aGVsbG8=").await.unwrap();
    assert_eq!(messages, vec!["Knee too far forward".to_string()]);
}

#[tokio::test]
async fn live_frame_failures_degrade_to_error_feedback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze_frame"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let messages = client(&server).analyze_frame_or_degraded("aGVsbG8=").await;
    assert_eq!(messages, vec!["Error analyzing frame".to_string()]);
}
