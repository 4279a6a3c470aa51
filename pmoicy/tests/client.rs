//! Connection tests against local servers

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pmoicy::{Error, IcyClient, IcyMetadata, IcyObserver, SilentObserver, StationInfo};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quiet_client() -> IcyClient {
    IcyClient::builder()
        .observer(Arc::new(SilentObserver))
        .connect_timeout(Duration::from_secs(2))
        .build()
}

/// `metaint` audio bytes, a block, `metaint` audio bytes
fn icy_body(metaint: usize, title: &str) -> Vec<u8> {
    let mut body = vec![b'A'; metaint];
    body.extend(IcyMetadata::with_title(title).to_block().unwrap());
    body.extend(vec![b'B'; metaint]);
    body
}

/// Open a stream on a blocking thread so the mock server keeps running
async fn open_blocking(
    client: IcyClient,
    url: String,
) -> pmoicy::Result<(StationInfo, Vec<u8>, Option<String>)> {
    tokio::task::spawn_blocking(move || {
        let mut stream = client.open(&url)?;
        let mut audio = Vec::new();
        stream.read_to_end(&mut audio)?;
        let title = stream
            .metadata()
            .and_then(|m| m.stream_title())
            .map(str::to_string);
        Ok((stream.station().clone(), audio, title))
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_open_http_stream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/live"))
        .and(header("icy-metadata", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .insert_header("icy-name", "Mock FM")
                .insert_header("icy-genre", "Jazz")
                .insert_header("icy-br", "128")
                .insert_header("icy-metaint", "16")
                .set_body_bytes(icy_body(16, "Miles Davis - So What")),
        )
        .mount(&mock_server)
        .await;

    let url = format!("{}/live", mock_server.uri());
    let (station, audio, title) = open_blocking(quiet_client(), url).await.unwrap();

    assert_eq!(station.name, "Mock FM");
    assert_eq!(station.genre, "Jazz");
    assert_eq!(station.bitrate, 128);
    assert_eq!(station.metaint, 16);
    assert_eq!(station.content_type.as_deref(), Some("audio/mpeg"));
    assert_eq!(audio, [vec![b'A'; 16], vec![b'B'; 16]].concat());
    assert_eq!(title.as_deref(), Some("Miles Davis - So What"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_follows_relative_redirect() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("icy-br", "64")
                .insert_header("icy-metaint", "8")
                .set_body_bytes(icy_body(8, "moved")),
        )
        .mount(&mock_server)
        .await;

    #[derive(Default)]
    struct Redirects(Mutex<Vec<(String, u16)>>);
    impl IcyObserver for Redirects {
        fn redirected(&self, _from: &Url, to: &Url, status: u16) {
            self.0.lock().unwrap().push((to.path().to_string(), status));
        }
    }

    let observer = Arc::new(Redirects::default());
    let client = IcyClient::builder().observer(observer.clone()).build();
    let url = format!("{}/old", mock_server.uri());
    let (station, _, title) = open_blocking(client, url).await.unwrap();

    assert_eq!(station.bitrate, 64);
    assert_eq!(title.as_deref(), Some("moved"));
    assert_eq!(*observer.0.lock().unwrap(), vec![("/new".to_string(), 302)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirect_loop_is_bounded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/loop"))
        .mount(&mock_server)
        .await;

    let client = IcyClient::builder()
        .observer(Arc::new(SilentObserver))
        .max_redirects(2)
        .build();
    let url = format!("{}/loop", mock_server.uri());
    let result = open_blocking(client, url).await;

    assert!(matches!(result, Err(Error::TooManyRedirects(2))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let url = format!("{}/missing", mock_server.uri());
    let result = open_blocking(quiet_client(), url).await;

    assert!(matches!(result, Err(Error::Status { code: 404, .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_metaint_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("icy-br", "128")
                .set_body_bytes(vec![0u8; 64]),
        )
        .mount(&mock_server)
        .await;

    let url = format!("{}/plain", mock_server.uri());
    let result = open_blocking(quiet_client(), url).await;

    assert!(matches!(result, Err(Error::MissingHeader("icy-metaint"))));
}

type RawServer = (String, mpsc::Sender<()>, thread::JoinHandle<String>);

fn raw_server(response: Vec<u8>) -> RawServer {
    raw_server_on(TcpListener::bind("127.0.0.1:0").unwrap(), response)
}

/// Serve one raw response, then keep the socket open until `release` fires
fn raw_server_on(listener: TcpListener, response: Vec<u8>) -> RawServer {
    let addr = listener.local_addr().unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let server = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.ends_with(b"\r\n\r\n") {
            let n = socket.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket.write_all(&response).unwrap();
        socket.flush().unwrap();
        let _ = release_rx.recv();
        String::from_utf8_lossy(&request).to_string()
    });

    (format!("http://{}/stream", addr), release_tx, server)
}

#[test]
fn test_icy_status_line_and_request_headers() {
    let mut response = b"ICY 200 OK\r\n\
        icy-notice1: <BR>This stream requires Winamp<BR>\r\n\
        icy-name: Raw Radio\r\n\
        icy-genre: Electronic\r\n\
        icy-url: http://raw.example\r\n\
        icy-br: 128,128\r\n\
        icy-metaint: 4\r\n\
        \r\n"
        .to_vec();
    response.extend(icy_body(4, "Daft Punk - Veridis Quo"));

    let (url, release, server) = raw_server(response);
    let mut stream = quiet_client().open(&url).unwrap();

    assert_eq!(stream.name(), "Raw Radio");
    assert_eq!(stream.genre(), "Electronic");
    assert_eq!(stream.url(), "http://raw.example");
    assert_eq!(stream.bitrate(), 128);
    assert_eq!(stream.metaint(), 4);

    let mut audio = vec![0u8; 8];
    stream.read_exact(&mut audio).unwrap();
    assert_eq!(audio, b"AAAABBBB");
    assert_eq!(stream.metadata().and_then(|m| m.artist()), Some("Daft Punk"));

    release.send(()).unwrap();
    let request = server.join().unwrap();
    assert!(request.starts_with("GET /stream HTTP/1.0\r\n"));
    assert!(request.contains("Icy-MetaData: 1\r\n"));
    assert!(request.contains("User-Agent: iTunes/12.9.2"));
    assert!(request.contains("Connection: close\r\n"));
}

#[test]
fn test_ipv6_literal_host() {
    // hosts without IPv6 loopback cannot run this
    let Ok(listener) = TcpListener::bind("[::1]:0") else {
        return;
    };
    let mut response = b"ICY 200 OK\r\nicy-name: Six\r\nicy-br: 96\r\nicy-metaint: 4\r\n\r\n".to_vec();
    response.extend(icy_body(4, "over v6"));

    let (url, release, server) = raw_server_on(listener, response);
    assert!(url.starts_with("http://[::1]:"));
    let mut stream = quiet_client().open(&url).unwrap();

    assert_eq!(stream.name(), "Six");
    let mut audio = vec![0u8; 8];
    stream.read_exact(&mut audio).unwrap();
    assert_eq!(audio, b"AAAABBBB");
    assert_eq!(stream.metadata().and_then(|m| m.stream_title()), Some("over v6"));

    release.send(()).unwrap();
    let request = server.join().unwrap();
    assert!(request.contains("\r\nHost: [::1]:"));
}

#[test]
fn test_close_handle_unblocks_read() {
    let mut response = b"ICY 200 OK\r\nicy-br: 128\r\nicy-metaint: 1000\r\n\r\n".to_vec();
    response.extend(vec![b'A'; 10]);

    let (url, release, server) = raw_server(response);
    let mut stream = quiet_client().open(&url).unwrap();
    let handle = stream.close_handle();

    let (done_tx, done_rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        let mut audio = Vec::new();
        let mut buf = [0u8; 64];
        let outcome = loop {
            match stream.read(&mut buf) {
                Ok(0) => break Ok(audio.len()),
                Ok(n) => audio.extend_from_slice(&buf[..n]),
                Err(e) => break Err(e.kind()),
            }
        };
        let _ = done_tx.send(outcome);
    });

    // the server stays silent after 10 bytes: the reader is now blocked
    thread::sleep(Duration::from_millis(200));
    assert!(done_rx.try_recv().is_err());

    handle.close().unwrap();
    handle.close().unwrap();
    let outcome = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("read was not unblocked by close");
    match outcome {
        Ok(n) => assert_eq!(n, 10),
        Err(kind) => assert_eq!(kind, std::io::ErrorKind::NotConnected),
    }

    reader.join().unwrap();
    release.send(()).unwrap();
    server.join().unwrap();
}

#[test]
fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = quiet_client().open(&format!("http://{}/stream", addr));
    assert!(matches!(result, Err(Error::Connect { .. })));
}
