//! Structured OCR client against a local fake of the `/ocr` endpoint.
//!
//! Each test binds a one-shot HTTP server on 127.0.0.1, points
//! `MistralOcrClient` at it, and checks both the request that went out and
//! how the canned answer is mapped.

use ocr2md::pipeline::encode::encode_bytes;
use ocr2md::{MistralOcrClient, OcrError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// ── Fake server ──────────────────────────────────────────────────────────────

/// Serve one canned response; resolve to the raw request that was received.
async fn serve_once(status: &str, headers: &[(&str, &str)], body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/v1", listener.local_addr().unwrap());

    let mut response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (k, v) in headers {
        response.push_str(&format!("{k}: {v}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(body);

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });
    (base, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn client(base: &str) -> MistralOcrClient {
    MistralOcrClient::new(base, "test-key", "mistral-ocr-latest", 10).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pages_returned_in_index_order() {
    let body = r##"{
        "pages": [
            {"index": 1, "markdown": "Second", "images": [], "dimensions": {"dpi": 200, "width": 1700, "height": 2200}},
            {"index": 0, "markdown": "# First", "images": [{"id": "img-0.jpeg"}]}
        ],
        "model": "mistral-ocr-2505",
        "usage_info": {"pages_processed": 2, "doc_size_bytes": 1234}
    }"##;
    let (base, server) = serve_once("200 OK", &[], body).await;
    let doc = encode_bytes(b"%PDF-1.7\n", "application/pdf").unwrap();

    let pages = client(&base).process(&doc).await.unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].markdown, "# First");
    assert_eq!(pages[0].images[0].id, "img-0.jpeg");
    assert_eq!(pages[1].dimensions.map(|d| d.width), Some(1700));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v1/ocr "));
    assert!(request.to_lowercase().contains("authorization: bearer test-key"));
    assert!(request.contains(r#""type":"document_url""#));
    assert!(request.contains("data:application/pdf;base64,"));
    assert!(request.contains(r#""include_image_base64":false"#));
}

#[tokio::test]
async fn test_image_sent_as_image_url() {
    let (base, server) = serve_once("200 OK", &[], r#"{"pages": []}"#).await;
    let doc = encode_bytes(b"\x89PNG\r\n\x1a\n", "image/png").unwrap();

    let pages = client(&base)
        .include_images(true)
        .process(&doc)
        .await
        .unwrap();

    assert!(pages.is_empty());
    let request = server.await.unwrap();
    assert!(request.contains(r#""type":"image_url""#));
    assert!(request.contains("data:image/png;base64,"));
    assert!(request.contains(r#""include_image_base64":true"#));
}

#[tokio::test]
async fn test_unauthorized_keeps_remote_message() {
    let (base, _server) =
        serve_once("401 Unauthorized", &[], r#"{"message": "No API key found in request"}"#).await;
    let doc = encode_bytes(b"%PDF-1.7\n", "application/pdf").unwrap();

    let err = client(&base).process(&doc).await.unwrap_err();

    match err {
        OcrError::AuthError { status, ref detail, .. } => {
            assert_eq!(status, 401);
            assert_eq!(detail, "No API key found in request");
        }
        other => panic!("expected AuthError, got {other:?}"),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let (base, _server) = serve_once(
        "429 Too Many Requests",
        &[("Retry-After", "12")],
        r#"{"message": "Requests rate limit exceeded"}"#,
    )
    .await;
    let doc = encode_bytes(b"%PDF-1.7\n", "application/pdf").unwrap();

    let err = client(&base).process(&doc).await.unwrap_err();

    assert!(matches!(
        err,
        OcrError::RateLimitExceeded {
            retry_after_secs: Some(12),
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("Requests rate limit exceeded"));
}

#[tokio::test]
async fn test_bad_request_detail_field() {
    let (base, _server) = serve_once(
        "422 Unprocessable Entity",
        &[],
        r#"{"detail": "Invalid document_url"}"#,
    )
    .await;
    let doc = encode_bytes(b"\xff\xd8\xff\xe0", "image/jpeg").unwrap();

    let err = client(&base).process(&doc).await.unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert!(err.to_string().contains("Invalid document_url"));
}

#[tokio::test]
async fn test_success_with_unreadable_body_is_malformed() {
    let (base, _server) = serve_once("200 OK", &[], "<html>gateway</html>").await;
    let doc = encode_bytes(b"%PDF-1.7\n", "application/pdf").unwrap();

    let err = client(&base).process(&doc).await.unwrap_err();

    assert!(matches!(err, OcrError::MalformedResponse { .. }));
}
