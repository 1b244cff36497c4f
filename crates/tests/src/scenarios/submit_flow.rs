//! Effect chain submission through to the comparison charts

use super::screen;
use ratatui::{backend::TestBackend, Terminal};
use sigscope_app::apply_effect_arg;
use sigscope_core::domain::backend::{
    self, BackendClient, BackendError, ProgressEvent, ProgressStream, SubmitOutcome, SubmitReply,
    SubmitRequest,
};
use sigscope_core::domain::chart::TimeMode;
use sigscope_core::domain::config::BackendConfig;
use sigscope_core::domain::session::{Session, SessionError};
use sigscope_infra::backend::HttpBackend;
use sigscope_ui::ComparisonView;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Backend frame JSON as the processing service sends it
fn frame_json(name: &str, low: f64, high: f64) -> serde_json::Value {
    let time: Vec<f64> = (0..120).map(|i| i as f64 / 120.0).collect();
    let input: Vec<f64> = time.iter().map(|t| (t * 40.0).sin()).collect();
    let output: Vec<f64> = input.iter().map(|v| v * 0.6).collect();
    let frequencies: Vec<f64> = (0..=80).map(|i| i as f64 * 250.0).collect();
    let power: Vec<f64> = frequencies.iter().map(|f| -30.0 - f / 1000.0).collect();

    serde_json::json!({
        "effectInfo": { "name": name, "frequencyRange": [low, high] },
        "timeDomain": { "time": time, "input": input, "output": output },
        "frequencyDomain": {
            "frequencies": frequencies,
            "powerInput": power,
            "powerOutput": power.iter().map(|p| p - 6.0).collect::<Vec<_>>(),
        }
    })
}

struct RecordingBackend {
    reply: String,
    requests: Mutex<Vec<SubmitRequest>>,
}

#[async_trait::async_trait]
impl BackendClient for RecordingBackend {
    async fn submit(&self, request: &SubmitRequest) -> backend::Result<SubmitOutcome> {
        self.requests.lock().unwrap().push(request.clone());
        serde_json::from_str::<SubmitReply>(&self.reply)?.into_result()
    }

    async fn open_progress(&self, _request: &SubmitRequest) -> backend::Result<ProgressStream> {
        Err(BackendError::Transport("streaming not offered".into()))
    }

    async fn cleanup(&self, _file_url: &str) -> backend::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_two_effect_chain_renders_two_chart_pairs() {
    let reply = serde_json::json!({
        "file_url": "http://localhost:5000/files/processed.mp3",
        "result": "Applied 2 effects",
        "visualizations": [
            frame_json("Low Shelf Filter", 20.0, 250.0),
            frame_json("Reverb", 20.0, 20000.0),
        ]
    });
    let backend = RecordingBackend {
        reply: reply.to_string(),
        requests: Mutex::new(Vec::new()),
    };

    let mut session = Session::new(backend);
    session.set_link("https://www.youtube.com/watch?v=abc");
    apply_effect_arg(session.chain_mut(), "bass@0-5,gain=6").unwrap();
    apply_effect_arg(session.chain_mut(), "reverb@5-10").unwrap();

    session.submit().await.unwrap();

    let sent = session.backend().requests.lock().unwrap()[0].clone();
    let wire = serde_json::to_value(&sent).unwrap();
    assert_eq!(wire["effects"][0]["effectType"], 1);
    assert_eq!(wire["effects"][0]["parameters"]["gain"], 6.0);
    assert_eq!(wire["effects"][1]["effectType"], 5);
    assert_eq!(wire["effects"][1]["start"], 5.0);

    let results = session.results();
    assert_eq!(results.len(), 2);

    let mut terminal = Terminal::new(TestBackend::new(140, 48)).unwrap();
    terminal
        .draw(|f| {
            ComparisonView {
                results: &results,
                status: "2 effect(s) applied",
                target_points: 50,
                scroll: 0,
                time_mode: TimeMode::Stems,
            }
            .render(f, f.area())
        })
        .unwrap();

    let text = screen(terminal.backend().buffer());
    assert!(text.contains("Bass Boost (0s - 5s)"));
    assert!(text.contains("Reverb (5s - 10s)"));
    assert_eq!(text.matches("Time Domain").count(), 2);
    assert_eq!(text.matches("Frequency Domain").count(), 2);
}

#[tokio::test]
async fn test_rejected_chain_never_submitted() {
    let backend = RecordingBackend {
        reply: "{}".to_string(),
        requests: Mutex::new(Vec::new()),
    };
    let mut session = Session::new(backend);
    session.set_link("");
    apply_effect_arg(session.chain_mut(), "chorus").unwrap();

    assert!(matches!(
        session.submit().await,
        Err(SessionError::Validation(_))
    ));
    assert!(session.backend().requests.lock().unwrap().is_empty());
}

/// Answer one request with a server-sent event body
async fn serve_events(events: Vec<serde_json::Value>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 8192];
        // Headers plus the JSON body arrive before the server answers
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if n == 0 || (text.contains("\r\n\r\n") && text.trim_end().ends_with('}')) {
                break;
            }
        }

        let body: String = events
            .iter()
            .map(|event| format!("data: {}\n\n", event))
            .collect();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_streaming_submit_over_http() {
    let base_url = serve_events(vec![
        serde_json::json!({ "status": "downloading" }),
        serde_json::json!({ "status": "processing", "effect_id": 3 }),
        serde_json::json!({
            "status": "done",
            "file_url": "http://localhost:5000/files/out.mp3",
            "result": "ok",
            "visualizations": [frame_json("High Shelf + Compressor", 4000.0, 20000.0)]
        }),
    ])
    .await;

    let config = BackendConfig {
        base_url,
        ..Default::default()
    };
    let mut session = Session::new(HttpBackend::new(&config).unwrap());
    session.set_link("https://youtu.be/abc");
    apply_effect_arg(session.chain_mut(), "high@1:00-1:30").unwrap();

    let mut messages = Vec::new();
    let outcome = session
        .submit_streaming(|event| messages.push(event.describe()))
        .await
        .unwrap()
        .clone();

    assert_eq!(
        messages,
        vec![
            "Downloading from YouTube...",
            "Applying Effect [3]: High Shelf + Compressor",
            "Done",
        ]
    );
    assert_eq!(outcome.file_url, "http://localhost:5000/files/out.mp3");

    let results = session.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title(), "High Boost (60s - 90s)");
    assert!(session.next_progress().await.unwrap().is_none());
}

#[tokio::test]
async fn test_stream_error_event_surfaces() {
    let base_url = serve_events(vec![
        serde_json::json!({ "status": "downloading" }),
        serde_json::json!({ "status": "error", "message": "Video unavailable" }),
    ])
    .await;

    let config = BackendConfig {
        base_url,
        ..Default::default()
    };
    let mut session = Session::new(HttpBackend::new(&config).unwrap());
    session.set_link("https://youtu.be/gone");
    apply_effect_arg(session.chain_mut(), "compressor").unwrap();

    let err = session.submit_streaming(|_| {}).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Backend(BackendError::Rejected("Video unavailable".into()))
    );
    assert_eq!(session.progress_message(), "Error: Video unavailable");
    assert!(session.outcome().is_none());
    assert!(ProgressEvent::Error { message: String::new() }.is_terminal());
}

#[tokio::test]
async fn test_reset_mid_stream_closes_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if n == 0 || (text.contains("\r\n\r\n") && text.trim_end().ends_with('}')) {
                break;
            }
        }

        // Headers and the first event only; processing never finishes
        let event = "data: {\"status\":\"downloading\"}\n\n";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
            event.len(),
            event
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();

        let read = tokio::time::timeout(Duration::from_secs(5), socket.read(&mut buf)).await;
        matches!(read, Ok(Ok(0)) | Ok(Err(_)))
    });

    let config = BackendConfig {
        base_url: format!("http://{}", addr),
        ..Default::default()
    };
    let mut session = Session::new(HttpBackend::new(&config).unwrap());
    session.set_link("https://youtu.be/long");
    apply_effect_arg(session.chain_mut(), "reverb").unwrap();

    session.open_progress().await.unwrap();
    assert_eq!(
        session.next_progress().await.unwrap(),
        Some(ProgressEvent::Downloading)
    );
    assert!(session.is_streaming());

    session.reset().await;
    assert!(!session.is_streaming());
    assert!(server.await.unwrap(), "connection still open after reset");
}
