//! Blocking mock SMTP server
//!
//! Accepts a single connection on a background thread, answers every command
//! from a per-verb script and records what the client sent. The connection
//! can be encrypted from the start or upgraded by `STARTTLS`, with a
//! self-signed certificate.
#![allow(dead_code)] // not every test uses every helper

use std::{
    collections::{HashMap, VecDeque},
    io::{self, BufRead, BufReader, Read, Write},
    net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    ServerConfig, ServerConnection, StreamOwned,
};

/// What the client sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A command line, CRLF removed
    Command(String),
    /// The raw message sent after `DATA`, without the final `.` line
    Message(Vec<u8>),
    /// The connection was upgraded after `STARTTLS`
    StartedTls,
    /// The connection ended encrypted, always last
    Encrypted,
}

/// How the mock server uses TLS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encryption {
    None,
    Wrapper,
    StartTls,
}

/// Builds a [`MockSmtpServer`]
pub struct MockSmtpServerBuilder {
    greeting: Option<String>,
    replies: HashMap<&'static str, VecDeque<String>>,
    encryption: Encryption,
}

impl MockSmtpServerBuilder {
    /// Replies to the next command of kind `verb` with `reply`
    ///
    /// Replies for one verb are used in order; once they run out the default
    /// one is used. Multi-line replies are separated by CRLF. `AUTH`
    /// continuation lines count as `AUTH`, `END` is the end of `DATA`.
    #[must_use]
    pub fn reply(mut self, verb: &'static str, reply: &str) -> Self {
        self.replies
            .entry(verb)
            .or_default()
            .push_back(reply.to_owned());
        self
    }

    /// Never sends the greeting
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.greeting = None;
        self
    }

    /// Runs TLS from the first byte
    #[must_use]
    pub fn tls(mut self) -> Self {
        self.encryption = Encryption::Wrapper;
        self
    }

    /// Offers `STARTTLS` in the first `EHLO` reply and upgrades when asked
    #[must_use]
    pub fn starttls(mut self) -> Self {
        self.encryption = Encryption::StartTls;
        self.replies
            .entry("EHLO")
            .or_default()
            .push_front("250-mock.test\r\n250 STARTTLS".to_owned());
        self
    }

    /// Starts listening on a random local port
    pub fn start(self) -> MockSmtpServer {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let tls_config = match self.encryption {
            Encryption::None => None,
            Encryption::Wrapper | Encryption::StartTls => Some(self_signed_config()),
        };

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let stream = match (&tls_config, self.encryption) {
                (Some(config), Encryption::Wrapper) => MockStream::encrypt(stream, config),
                _ => MockStream::Plain(stream),
            };
            serve(stream, tls_config, self.greeting, self.replies)
        });

        MockSmtpServer { addr, handle }
    }
}

/// Server configuration for a certificate generated on the spot
fn self_signed_config() -> Arc<ServerConfig> {
    let cert = rcgen::generate_simple_self_signed(vec!["mock.test".to_owned()]).unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert_der], key_der)
    .unwrap();
    Arc::new(config)
}

/// The server side of the connection, plain or encrypted
enum MockStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl MockStream {
    fn encrypt(stream: TcpStream, config: &Arc<ServerConfig>) -> Self {
        let conn = ServerConnection::new(Arc::clone(config)).unwrap();
        MockStream::Tls(Box::new(StreamOwned::new(conn, stream)))
    }

    fn is_encrypted(&self) -> bool {
        matches!(self, MockStream::Tls(_))
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MockStream::Plain(stream) => stream.read(buf),
            MockStream::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MockStream::Plain(stream) => stream.write(buf),
            MockStream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MockStream::Plain(stream) => stream.flush(),
            MockStream::Tls(stream) => stream.flush(),
        }
    }
}

/// Mock SMTP server for one connection
pub struct MockSmtpServer {
    addr: SocketAddr,
    handle: JoinHandle<Vec<Received>>,
}

impl MockSmtpServer {
    /// Server greeting and advertising 8BITMIME, everything else accepted
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            greeting: Some("220 mock.test ESMTP ready".to_owned()),
            replies: HashMap::new(),
            encryption: Encryption::None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Waits for the client to go away and returns what it sent
    pub fn received(self) -> Vec<Received> {
        self.handle.join().unwrap()
    }

    /// Only the command lines of [`MockSmtpServer::received`]
    pub fn commands(self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter_map(|received| match received {
                Received::Command(line) => Some(line),
                _ => None,
            })
            .collect()
    }
}

fn default_reply(verb: &str) -> &'static str {
    match verb {
        "EHLO" => "250-mock.test\r\n250 8BITMIME",
        "HELO" => "250 mock.test",
        "MAIL" | "RCPT" => "250 OK",
        "DATA" => "354 End data with <CR><LF>.<CR><LF>",
        "END" => "250 OK: queued as 1",
        "AUTH" => "235 2.7.0 Authentication successful",
        "STARTTLS" => "220 Ready to start TLS",
        "QUIT" => "221 Bye",
        _ => "500 Command not recognized",
    }
}

fn serve(
    stream: MockStream,
    tls_config: Option<Arc<ServerConfig>>,
    greeting: Option<String>,
    mut replies: HashMap<&'static str, VecDeque<String>>,
) -> Vec<Received> {
    let mut received = Vec::new();
    let mut reader = BufReader::new(stream);

    let Some(greeting) = greeting else {
        // wait for the client to give up
        let mut line = Vec::new();
        let _ = reader.read_until(b'\n', &mut line);
        return received;
    };
    if send(&mut reader, &greeting).is_err() {
        return received;
    }

    let mut in_auth = false;
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&line)
            .trim_end_matches(['\r', '\n'])
            .to_owned();

        let verb = if in_auth {
            "AUTH"
        } else {
            match line.split_whitespace().next() {
                Some(word) => match word.to_ascii_uppercase().as_str() {
                    "EHLO" => "EHLO",
                    "HELO" => "HELO",
                    "MAIL" => "MAIL",
                    "RCPT" => "RCPT",
                    "DATA" => "DATA",
                    "AUTH" => "AUTH",
                    "STARTTLS" => "STARTTLS",
                    "QUIT" => "QUIT",
                    _ => "OTHER",
                },
                None => "OTHER",
            }
        };
        received.push(Received::Command(line));

        let reply = next_reply(&mut replies, verb);
        in_auth = verb == "AUTH" && reply.starts_with("334");
        if send(&mut reader, &reply).is_err() {
            break;
        }

        match verb {
            "QUIT" => break,
            "DATA" if reply.starts_with("354") => {
                let Some(message) = read_message(&mut reader) else {
                    break;
                };
                received.push(Received::Message(message));
                let reply = next_reply(&mut replies, "END");
                if send(&mut reader, &reply).is_err() {
                    break;
                }
            }
            "STARTTLS" if reply.starts_with("220") => {
                let (Some(config), MockStream::Plain(stream)) = (&tls_config, reader.into_inner())
                else {
                    return received;
                };
                reader = BufReader::new(MockStream::encrypt(stream, config));
                received.push(Received::StartedTls);
            }
            _ => {}
        }
    }

    if reader.get_ref().is_encrypted() {
        received.push(Received::Encrypted);
    }
    received
}

/// Writes one reply line, or several separated by CRLF
fn send(reader: &mut BufReader<MockStream>, reply: &str) -> io::Result<()> {
    let stream = reader.get_mut();
    stream.write_all(format!("{reply}\r\n").as_bytes())?;
    stream.flush()
}

fn next_reply(replies: &mut HashMap<&'static str, VecDeque<String>>, verb: &'static str) -> String {
    replies
        .get_mut(verb)
        .and_then(VecDeque::pop_front)
        .unwrap_or_else(|| default_reply(verb).to_owned())
}

/// Reads up to the `.` line, keeping dot-stuffing as sent
fn read_message(reader: &mut BufReader<MockStream>) -> Option<Vec<u8>> {
    let mut message = Vec::new();
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        if line == b".\r\n" {
            return Some(message);
        }
        message.extend_from_slice(&line);
    }
}
