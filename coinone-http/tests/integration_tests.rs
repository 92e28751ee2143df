//! Integration tests for the single-use request lifecycle

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use coinone_http::{
    BodySink, BodySource, ClosePolicy, Connection, ConnectionFactory, HttpRequest, Method, ProxySettings,
    RequestError,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use proptest::prelude::*;
use url::Url;

#[derive(Clone, Default)]
struct Recorder {
    creates: Arc<AtomicUsize>,
    exchanges: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    body_closes: Arc<AtomicUsize>,
    body: Arc<Mutex<Vec<u8>>>,
    headers: Arc<Mutex<HashMap<String, String>>>,
    proxy: Arc<Mutex<Option<ProxySettings>>>,
    timeout: Arc<Mutex<Option<Duration>>>,
}

impl Recorder {
    fn body_text(&self) -> String {
        String::from_utf8(self.body.lock().unwrap().clone()).unwrap()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.lock().unwrap().get(&name.to_ascii_lowercase()).cloned()
    }
}

#[derive(Clone)]
struct Canned {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
    error_body: bool,
    fail_source_close: bool,
}

impl Canned {
    fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.to_vec(),
            error_body: false,
            fail_source_close: false,
        }
    }

    fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

struct FakeFactory {
    canned: Canned,
    recorder: Recorder,
}

impl FakeFactory {
    fn new(canned: Canned) -> (Arc<Self>, Recorder) {
        let recorder = Recorder::default();
        (
            Arc::new(Self {
                canned,
                recorder: recorder.clone(),
            }),
            recorder,
        )
    }
}

impl ConnectionFactory for FakeFactory {
    fn create(&self, _url: &Url, _method: &Method, proxy: Option<&ProxySettings>) -> io::Result<Box<dyn Connection>> {
        self.recorder.creates.fetch_add(1, Ordering::SeqCst);
        *self.recorder.proxy.lock().unwrap() = proxy.cloned();
        Ok(Box::new(FakeConnection {
            canned: self.canned.clone(),
            recorder: self.recorder.clone(),
            sent: false,
            body_taken: false,
        }))
    }
}

struct FakeConnection {
    canned: Canned,
    recorder: Recorder,
    sent: bool,
    body_taken: bool,
}

impl FakeConnection {
    fn send(&mut self) {
        if !self.sent {
            self.sent = true;
            self.recorder.exchanges.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn take_body(&mut self) -> Option<Box<dyn BodySource>> {
        if self.body_taken {
            return None;
        }
        self.body_taken = true;
        Some(Box::new(FakeSource {
            inner: Cursor::new(self.canned.body.clone()),
            fail_close: self.canned.fail_source_close,
        }))
    }
}

impl Connection for FakeConnection {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        *self.recorder.timeout.lock().unwrap() = Some(timeout);
        Ok(())
    }

    fn set_request_property(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.recorder
            .headers
            .lock()
            .unwrap()
            .insert(name.to_ascii_lowercase(), value.to_string());
        Ok(())
    }

    fn request_property(&self, name: &str) -> Option<String> {
        self.recorder.header(name)
    }

    fn open_output(&mut self) -> io::Result<Box<dyn BodySink>> {
        Ok(Box::new(FakeSink {
            body: self.recorder.body.clone(),
            closes: self.recorder.body_closes.clone(),
        }))
    }

    fn response_code(&mut self) -> io::Result<u16> {
        self.send();
        Ok(self.canned.status)
    }

    fn header_field(&mut self, name: &str) -> io::Result<Option<String>> {
        self.send();
        Ok(self
            .canned
            .headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone()))
    }

    fn input_stream(&mut self) -> io::Result<Box<dyn BodySource>> {
        self.send();
        if self.canned.status >= 400 {
            return Err(io::Error::new(io::ErrorKind::NotFound, "error status"));
        }
        self.take_body()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "body consumed"))
    }

    fn error_stream(&mut self) -> Option<Box<dyn BodySource>> {
        if self.canned.status >= 400 && self.canned.error_body {
            self.take_body()
        } else {
            None
        }
    }

    fn disconnect(&mut self) {
        self.recorder.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeSink {
    body: Arc<Mutex<Vec<u8>>>,
    closes: Arc<AtomicUsize>,
}

impl Write for FakeSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BodySink for FakeSink {
    fn close(&mut self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeSource {
    inner: Cursor<Vec<u8>>,
    fail_close: bool,
}

impl Read for FakeSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BodySource for FakeSource {
    fn close(&mut self) -> io::Result<()> {
        if self.fail_close {
            Err(io::Error::new(io::ErrorKind::Other, "close failed"))
        } else {
            Ok(())
        }
    }
}

fn request(canned: Canned, method: Method) -> (HttpRequest, Recorder) {
    let (factory, recorder) = FakeFactory::new(canned);
    let request = HttpRequest::with_factory("https://api.coinone.co.kr/v2/order", method, factory).unwrap();
    (request, recorder)
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_form_fields_are_joined_and_encoded() {
    let (mut req, recorder) = request(Canned::ok(b""), Method::POST);
    req.form_field("currency", Some("btc"), None).unwrap();
    req.form_field("note", Some("a b&c"), None).unwrap();
    req.form_field("empty", None, None).unwrap();
    assert_eq!(req.code().unwrap(), 200);

    assert_eq!(recorder.body_text(), "currency=btc&note=a+b%26c&empty=");
    assert_eq!(
        recorder.header("Content-Type").as_deref(),
        Some("application/x-www-form-urlencoded; charset=UTF-8")
    );
}

#[test]
fn test_form_map_uses_requested_charset() {
    let (mut req, recorder) = request(Canned::ok(b""), Method::POST);
    req.form_with_charset([("name", "é")], Some("ISO-8859-1")).unwrap();
    req.ok().unwrap();

    assert_eq!(recorder.body_text(), "name=%E9");
    assert_eq!(
        recorder.header("content-type").as_deref(),
        Some("application/x-www-form-urlencoded; charset=ISO-8859-1")
    );
}

#[test]
fn test_response_is_sent_once_and_connection_created_once() {
    let (mut req, recorder) = request(Canned::ok(b"{}").with_header("Content-Length", "2"), Method::POST);
    req.read_timeout(10_000).unwrap();
    req.header("X-COINONE-PAYLOAD", "abc").unwrap();
    req.send_str("{}").unwrap();

    assert_eq!(req.code().unwrap(), 200);
    assert_eq!(req.code().unwrap(), 200);
    assert!(req.ok().unwrap());
    assert_eq!(req.content_length().unwrap(), Some(2));
    assert_eq!(req.body().unwrap(), "{}");

    assert_eq!(recorder.creates.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.exchanges.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.body_closes.load(Ordering::SeqCst), 1);
    assert_eq!(*recorder.timeout.lock().unwrap(), Some(Duration::from_secs(10)));
}

#[test]
fn test_configuration_after_send_is_rejected() {
    let (mut req, _recorder) = request(Canned::ok(b""), Method::POST);
    req.code().unwrap();
    assert!(matches!(req.header("X-Late", "1"), Err(RequestError::InvalidState(_))));
    assert!(matches!(req.read_timeout(5), Err(RequestError::InvalidState(_))));
    assert!(matches!(req.send_str("late"), Err(RequestError::InvalidState(_))));
}

#[test]
fn test_proxy_reaches_factory() {
    let (mut req, recorder) = request(Canned::ok(b""), Method::GET);
    req.proxy("proxy.local", 3128).unwrap();
    req.code().unwrap();
    assert_eq!(
        recorder.proxy.lock().unwrap().clone(),
        Some(ProxySettings::new("proxy.local", 3128))
    );
}

#[test]
fn test_error_status_reads_error_stream() {
    let mut canned = Canned::ok(b"not found").status(404);
    canned.error_body = true;
    let (mut req, _recorder) = request(canned, Method::GET);
    assert!(!req.ok().unwrap());
    assert_eq!(req.body().unwrap(), "not found");
}

#[test]
fn test_error_status_without_body_is_empty() {
    let (mut req, _recorder) = request(Canned::ok(b"").status(500), Method::GET);
    assert_eq!(req.code().unwrap(), 500);
    assert_eq!(req.body().unwrap(), "");
}

#[test]
fn test_error_status_with_declared_content_fails() {
    let canned = Canned::ok(b"").status(503).with_header("Content-Length", "12");
    let (mut req, _recorder) = request(canned, Method::GET);
    assert!(matches!(req.body(), Err(RequestError::Transport(_))));
}

#[test]
fn test_gzip_response_is_decoded() {
    let canned = Canned::ok(&gzip(b"{\"result\":\"success\"}")).with_header("Content-Encoding", "gzip");
    let (mut req, _recorder) = request(canned, Method::GET);
    assert_eq!(req.body().unwrap(), "{\"result\":\"success\"}");
}

#[test]
fn test_gzip_left_alone_when_uncompress_disabled() {
    let compressed = gzip(b"payload");
    let canned = Canned::ok(&compressed).with_header("Content-Encoding", "gzip");
    let (mut req, _recorder) = request(canned, Method::GET);
    req.uncompress(false);
    assert_eq!(req.bytes().unwrap(), compressed);
}

#[test]
fn test_response_charset_decodes_body() {
    let canned = Canned::ok(&[0x63, 0x61, 0x66, 0xE9]).with_header("Content-Type", "text/plain; charset=\"ISO-8859-1\"");
    let (mut req, _recorder) = request(canned, Method::GET);
    assert_eq!(req.charset().unwrap().as_deref(), Some("ISO-8859-1"));
    assert_eq!(req.body().unwrap(), "café");
}

#[test]
fn test_close_errors_follow_policy() {
    let mut canned = Canned::ok(b"data");
    canned.fail_source_close = true;

    let (mut ignoring, _) = request(canned.clone(), Method::GET);
    assert_eq!(ignoring.bytes().unwrap(), b"data");

    let (mut strict, _) = request(canned, Method::GET);
    strict.close_policy(ClosePolicy::Propagate);
    assert!(matches!(strict.bytes(), Err(RequestError::Transport(_))));
}

#[test]
fn test_drop_disconnects_once() {
    let (mut req, recorder) = request(Canned::ok(b""), Method::GET);
    req.code().unwrap();
    req.disconnect();
    req.disconnect();
    drop(req);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);

    let (mut req, recorder) = request(Canned::ok(b""), Method::GET);
    req.code().unwrap();
    drop(req);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unused_request_never_connects() {
    let (req, recorder) = request(Canned::ok(b""), Method::GET);
    drop(req);
    assert_eq!(recorder.creates.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_upload_progress_reports_total() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder_seen = seen.clone();
    let (mut req, recorder) = request(Canned::ok(b""), Method::POST);
    req.buffer_size(3).unwrap();
    req.upload_size(7);
    req.progress(move |sent: u64, total: Option<u64>| recorder_seen.lock().unwrap().push((sent, total)));
    req.send_reader(Cursor::new(b"abcdefg".to_vec())).unwrap();
    req.code().unwrap();

    assert_eq!(recorder.body_text(), "abcdefg");
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[(3, Some(7)), (6, Some(7)), (7, Some(7))]
    );
}

#[test]
fn test_real_transport_posts_form_and_decodes_gzip() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v2/order")
        .match_header("content-type", "application/x-www-form-urlencoded; charset=UTF-8")
        .match_body("a=1&b=x+y")
        .with_status(200)
        .with_header("content-encoding", "gzip")
        .with_body(gzip(b"accepted"))
        .create();

    let mut req = HttpRequest::post(&format!("{}/v2/order", server.url())).unwrap();
    req.read_timeout(5_000).unwrap();
    req.form([("a", "1"), ("b", "x y")]).unwrap();
    assert!(req.ok().unwrap());
    assert_eq!(req.body().unwrap(), "accepted");
    mock.assert();
}

#[test]
fn test_real_transport_exposes_error_body() {
    let mut server = mockito::Server::new();
    let mock = server.mock("GET", "/missing").with_status(404).with_body("not found").create();

    let mut req = HttpRequest::get(&format!("{}/missing", server.url())).unwrap();
    assert_eq!(req.code().unwrap(), 404);
    assert_eq!(req.body().unwrap(), "not found");
    mock.assert();
}

struct RefusingFactory;

impl ConnectionFactory for RefusingFactory {
    fn create(&self, _url: &Url, _method: &Method, _proxy: Option<&ProxySettings>) -> io::Result<Box<dyn Connection>> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
    }
}

fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://{}/v2/order", listener.local_addr().unwrap())
}

#[test]
fn test_form_encoding_failure_is_transport() {
    let (mut req, recorder) = request(Canned::ok(b""), Method::POST);
    let error = req.form_with_charset([("name", "원")], Some("ISO-8859-1")).unwrap_err();
    assert!(matches!(error, RequestError::Transport(ref e) if e.kind() == io::ErrorKind::InvalidInput));
    assert!(recorder.body_text().is_empty());
    assert_eq!(recorder.header("content-type"), None);

    let error = req.form_field("name", Some("value"), Some("KOI8-R")).unwrap_err();
    assert!(matches!(error, RequestError::Transport(_)));
}

#[test]
fn test_header_after_body_opened_is_rejected() {
    let (mut req, recorder) = request(Canned::ok(b""), Method::POST);
    req.header("X-First", "1").unwrap();
    req.send_str("qty=5").unwrap();
    assert!(matches!(req.header("X-Late", "1"), Err(RequestError::InvalidState(_))));
    assert!(matches!(req.accept_gzip_encoding(), Err(RequestError::InvalidState(_))));
    req.code().unwrap();

    assert_eq!(recorder.header("x-first").as_deref(), Some("1"));
    assert_eq!(recorder.header("x-late"), None);
    assert_eq!(recorder.body_text(), "qty=5");
}

#[test]
fn test_drop_closes_open_body() {
    let (mut req, recorder) = request(Canned::ok(b""), Method::POST);
    req.send_str("qty=5").unwrap();
    drop(req);
    assert_eq!(recorder.body_closes.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.exchanges.load(Ordering::SeqCst), 0);

    let (mut req, recorder) = request(Canned::ok(b""), Method::POST);
    req.send_str("qty=5").unwrap();
    req.disconnect();
    assert_eq!(recorder.body_closes.load(Ordering::SeqCst), 1);
    assert!(matches!(req.code(), Err(RequestError::InvalidState(_))));
}

#[test]
fn test_factory_failure_is_transport() {
    let factory = Arc::new(RefusingFactory);
    let mut req = HttpRequest::with_factory("https://api.coinone.co.kr/v2/order", Method::GET, factory).unwrap();
    let error = req.code().unwrap_err();
    assert!(error.is_recoverable());
    assert_eq!(error.io_error().map(io::Error::kind), Some(io::ErrorKind::ConnectionRefused));
    assert!(!req.is_active());
}

#[test]
fn test_refused_connection_is_transport() {
    let mut req = HttpRequest::get(&unused_local_url()).unwrap();
    req.read_timeout(2_000).unwrap();
    let error = req.code().unwrap_err();
    assert!(matches!(error, RequestError::Transport(_)));
    assert!(error.is_recoverable());
}

#[test]
fn test_dropped_connection_is_not_resent() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/v2/order", listener.local_addr().unwrap());
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf);
        drop(stream);
        listener
    });

    let mut req = HttpRequest::post(&url).unwrap();
    req.read_timeout(2_000).unwrap();
    req.send_str("qty=5").unwrap();
    assert!(matches!(req.code(), Err(RequestError::Transport(_))));
    assert!(matches!(req.code(), Err(RequestError::Transport(_))));
    assert!(matches!(req.body(), Err(RequestError::Transport(_))));

    let listener = server.join().unwrap();
    listener.set_nonblocking(true).unwrap();
    let second = listener.accept().map(|_| ()).unwrap_err();
    assert_eq!(second.kind(), io::ErrorKind::WouldBlock);
}

proptest! {
    #[test]
    fn prop_form_fields_separated_by_ampersand(
        fields in prop::collection::vec(("[a-z]{1,8}", "[a-zA-Z0-9]{0,8}"), 1..8)
    ) {
        let (mut req, recorder) = request(Canned::ok(b""), Method::POST);
        for (name, value) in &fields {
            req.form_field(name, Some(value.as_str()), None).unwrap();
        }
        req.code().unwrap();

        let expected = fields
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        prop_assert_eq!(recorder.body_text(), expected);
    }
}
