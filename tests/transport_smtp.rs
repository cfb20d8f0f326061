mod support;

use std::{
    io::Write,
    net::{Ipv4Addr, TcpListener},
    time::Duration,
};

use pretty_assertions::assert_eq;
use smtp_mailer::{
    message::{Content, EmailAddress, Message},
    transport::smtp::{
        authentication::{Authentication, Credentials, SaslMechanism},
        client::send_mail,
        extension::ClientId,
        Security, Session, SessionState, SmtpConfig, TlsOptions,
    },
    Envelope, RecipientPolicy, SmtpTransport, Transport,
};
use support::mock_server::{MockSmtpServer, Received};

fn config(port: u16, security: Security) -> SmtpConfig {
    let mut config = SmtpConfig::new("127.0.0.1", port, security);
    config.hello_name = ClientId::Domain("client.test".to_owned());
    config.timeout = Some(Duration::from_secs(5));
    config
}

fn message(to: &[&str]) -> Message {
    Message {
        from: Some(EmailAddress::new(Some("Sender"), "sender@example.com")),
        to: to.iter().map(|to| (*to).to_owned()).collect(),
        subject: "Hello".to_owned(),
        content: Content::plain("Hello ß☺ example"),
        ..Default::default()
    }
}

fn tls_options() -> TlsOptions {
    TlsOptions {
        insecure_skip_verify: true,
        ..Default::default()
    }
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[test]
fn smtp_transport_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
    let server = MockSmtpServer::builder().start();
    let email = message(&["a@example.com", "b@example.com"]);

    let response = SmtpTransport::new(config(server.port(), Security::None))
        .send(&email)
        .unwrap();
    assert_eq!(response.code().to_string(), "250");

    let mut expected_message = email.formatted();
    expected_message.extend_from_slice(b"\r\n");
    assert_eq!(
        server.received(),
        vec![
            Received::Command("EHLO client.test".to_owned()),
            Received::Command("MAIL FROM:<sender@example.com> BODY=8BITMIME".to_owned()),
            Received::Command("RCPT TO:<a@example.com>".to_owned()),
            Received::Command("RCPT TO:<b@example.com>".to_owned()),
            Received::Command("DATA".to_owned()),
            Received::Message(expected_message),
            Received::Command("QUIT".to_owned()),
        ]
    );
}

#[test]
fn rejected_recipient_stops_delivery() {
    let server = MockSmtpServer::builder()
        .reply("RCPT", "250 OK")
        .reply("RCPT", "550 5.1.1 No such user")
        .start();
    let email = message(&["a@example.com", "b@example.com", "c@example.com"]);

    let err = SmtpTransport::new(config(server.port(), Security::None))
        .send(&email)
        .unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(err.status().map(u16::from), Some(550));
    assert!(err.to_string().contains("No such user"));

    assert_eq!(
        server.commands(),
        vec![
            "EHLO client.test",
            "MAIL FROM:<sender@example.com> BODY=8BITMIME",
            "RCPT TO:<a@example.com>",
            "RCPT TO:<b@example.com>",
            "QUIT",
        ]
    );
}

#[test]
fn transient_sender_rejection() {
    let server = MockSmtpServer::builder()
        .reply("MAIL", "451 4.3.0 Try again later")
        .start();

    let err = SmtpTransport::new(config(server.port(), Security::None))
        .send(&message(&["a@example.com"]))
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.status().map(u16::from), Some(451));
    assert!(!server.commands().contains(&"DATA".to_owned()));
}

#[test]
fn unreachable_host() {
    let err = SmtpTransport::new(config(closed_port(), Security::None))
        .send(&message(&["a@example.com"]))
        .unwrap_err();
    assert!(err.is_connection());
}

#[test]
fn unreachable_host_with_tls() {
    let err = SmtpTransport::new(config(
        closed_port(),
        Security::Wrapper(TlsOptions::default()),
    ))
    .send(&message(&["a@example.com"]))
    .unwrap_err();
    assert!(err.is_connection());
}

#[test]
fn missing_sender_is_refused_before_connecting() {
    let email = Message {
        from: None,
        ..message(&["a@example.com"])
    };

    // nothing listens there, a connection attempt would be a connection error
    let err = SmtpTransport::new(config(closed_port(), Security::None))
        .send(&email)
        .unwrap_err();
    assert!(err.is_client());
}

#[test]
fn missing_recipients_are_refused_before_connecting() {
    let err = SmtpTransport::new(config(closed_port(), Security::None))
        .send(&message(&[]))
        .unwrap_err();
    assert!(err.is_client());
}

#[test]
fn helo_fallback() {
    let server = MockSmtpServer::builder()
        .reply("EHLO", "502 5.5.2 Command not implemented")
        .start();

    SmtpTransport::new(config(server.port(), Security::None))
        .send(&message(&["a@example.com"]))
        .unwrap();

    let commands = server.commands();
    assert_eq!(
        commands[..3],
        [
            "EHLO client.test",
            "HELO client.test",
            // no extension known after HELO
            "MAIL FROM:<sender@example.com>",
        ]
    );
}

#[test]
fn lines_starting_with_a_dot_are_escaped() {
    let server = MockSmtpServer::builder().start();
    let envelope = Envelope::new(
        Some("sender@example.com".to_owned()),
        vec!["a@example.com".to_owned()],
    )
    .unwrap();

    SmtpTransport::new(config(server.port(), Security::None))
        .send_raw(&envelope, b".first\r\nsecond\r\n.\r\nlast")
        .unwrap();

    let message = server.received().into_iter().find_map(|received| match received {
        Received::Message(message) => Some(message),
        _ => None,
    });
    assert_eq!(
        String::from_utf8(message.unwrap()).unwrap(),
        "..first\r\nsecond\r\n..\r\nlast\r\n"
    );
}

#[test]
fn all_recipients_policy() {
    let server = MockSmtpServer::builder().start();
    let email = Message {
        cc: vec!["c@example.com".to_owned(), "a@example.com".to_owned()],
        bcc: vec!["b@example.com".to_owned()],
        ..message(&["a@example.com"])
    };
    let mut config = config(server.port(), Security::None);
    config.recipient_policy = RecipientPolicy::All;

    SmtpTransport::new(config).send(&email).unwrap();

    let recipients: Vec<String> = server
        .commands()
        .into_iter()
        .filter(|command| command.starts_with("RCPT"))
        .collect();
    assert_eq!(
        recipients,
        vec![
            "RCPT TO:<a@example.com>",
            "RCPT TO:<c@example.com>",
            "RCPT TO:<b@example.com>",
        ]
    );
}

#[test]
fn auth_plain_to_localhost() {
    let server = MockSmtpServer::builder()
        .reply("EHLO", "250-mock.test\r\n250 AUTH PLAIN LOGIN")
        .start();
    let mut config = config(server.port(), Security::None);
    config.authentication = Some(Authentication::plain("", "user", "pass", "127.0.0.1"));

    SmtpTransport::new(config)
        .send(&message(&["a@example.com"]))
        .unwrap();

    let commands = server.commands();
    assert_eq!(commands[1], "AUTH PLAIN AHVzZXIAcGFzcw==");
    assert_eq!(commands[2], "MAIL FROM:<sender@example.com>");
}

#[test]
fn auth_login_challenges() {
    let server = MockSmtpServer::builder()
        .reply("EHLO", "250-mock.test\r\n250 AUTH LOGIN")
        .reply("AUTH", "334 VXNlcm5hbWU6")
        .reply("AUTH", "334 UGFzc3dvcmQ6")
        .reply("AUTH", "235 2.7.0 Authentication successful")
        .start();
    let mut config = config(server.port(), Security::None);
    config.authentication = Some(Authentication::Login(Credentials::from((
        "alice",
        "wonderland",
    ))));

    SmtpTransport::new(config)
        .send(&message(&["a@example.com"]))
        .unwrap();

    assert_eq!(
        server.commands()[1..4],
        ["AUTH LOGIN", "YWxpY2U=", "d29uZGVybGFuZA=="]
    );
}

#[test]
fn auth_rejected() {
    let server = MockSmtpServer::builder()
        .reply("EHLO", "250-mock.test\r\n250 AUTH PLAIN")
        .reply("AUTH", "535 5.7.8 Authentication credentials invalid")
        .start();
    let mut config = config(server.port(), Security::None);
    config.authentication = Some(Authentication::plain("", "user", "pass", "127.0.0.1"));

    let err = SmtpTransport::new(config)
        .send(&message(&["a@example.com"]))
        .unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(server.commands().last().unwrap(), "QUIT");
}

#[test]
fn unknown_challenge_cancels_auth() {
    let server = MockSmtpServer::builder()
        .reply("EHLO", "250-mock.test\r\n250 AUTH LOGIN")
        .reply("AUTH", "334 VG9rZW46")
        .reply("AUTH", "501 5.7.0 Authentication cancelled")
        .start();
    let mut config = config(server.port(), Security::None);
    config.authentication = Some(Authentication::Login(Credentials::from(("a", "b"))));

    let err = SmtpTransport::new(config)
        .send(&message(&["a@example.com"]))
        .unwrap_err();
    assert!(err.is_client());
    assert_eq!(server.commands()[1..3], ["AUTH LOGIN", "*"]);
}

#[test]
fn auth_not_advertised() {
    let server = MockSmtpServer::builder().start();
    let mut config = config(server.port(), Security::None);
    config.authentication = Some(Authentication::plain("", "user", "pass", "127.0.0.1"));

    let err = SmtpTransport::new(config)
        .send(&message(&["a@example.com"]))
        .unwrap_err();
    assert!(err.is_client());
    assert_eq!(server.commands(), vec!["EHLO client.test", "QUIT"]);
}

#[test]
fn plain_refused_for_remote_host_without_tls() {
    let server = MockSmtpServer::builder()
        .reply("EHLO", "250-mock.test\r\n250 AUTH PLAIN")
        .start();

    let auth: &dyn SaslMechanism = &Authentication::plain("", "user", "pass", "smtp.example.com");
    let envelope = Envelope::new(
        Some("sender@example.com".to_owned()),
        vec!["a@example.com".to_owned()],
    )
    .unwrap();
    // connect by address, but authenticate as if talking to a remote host
    let err = send_mail(
        ("127.0.0.1", server.port()),
        Some(Duration::from_secs(5)),
        &ClientId::Domain("client.test".to_owned()),
        Some(auth),
        &envelope,
        b"Subject: hi\r\n\r\nhi",
    )
    .unwrap_err();
    assert!(err.is_client());
    assert!(!server.commands().iter().any(|c| c.starts_with("AUTH")));
}

#[test]
fn greeting_timeout() {
    let server = MockSmtpServer::builder().silent().start();
    let mut config = config(server.port(), Security::None);
    config.timeout = Some(Duration::from_millis(200));

    let err = SmtpTransport::new(config)
        .send(&message(&["a@example.com"]))
        .unwrap_err();
    assert!(err.is_network());
    assert!(err.is_timeout());
}

#[test]
fn wrapper_against_plaintext_server() {
    let server = MockSmtpServer::builder().start();

    let err = SmtpTransport::new(config(
        server.port(),
        Security::Wrapper(TlsOptions::default()),
    ))
    .send(&message(&["a@example.com"]))
    .unwrap_err();
    assert!(err.is_tls());
}

#[test]
fn starttls_not_offered() {
    let server = MockSmtpServer::builder().start();

    let err = SmtpTransport::new(config(
        server.port(),
        Security::StartTls(TlsOptions::default()),
    ))
    .send(&message(&["a@example.com"]))
    .unwrap_err();
    assert!(err.is_client());
    assert_eq!(server.commands(), vec!["EHLO client.test", "QUIT"]);
}

#[test]
fn session_steps() {
    let server = MockSmtpServer::builder().start();

    let mut session = Session::connect(&config(server.port(), Security::None)).unwrap();
    assert_eq!(session.state(), SessionState::Greeting);
    assert!(!session.is_encrypted());

    session.hello().unwrap();
    assert_eq!(session.state(), SessionState::Authenticating);
    assert_eq!(session.server_info().name(), "mock.test");

    session.mail(Some("sender@example.com")).unwrap();
    assert_eq!(session.state(), SessionState::AddingRecipients(0));

    session.rcpt("a@example.com").unwrap();
    session.rcpt("b@example.com").unwrap();
    assert_eq!(session.state(), SessionState::AddingRecipients(2));

    let mut data = session.data().unwrap();
    data.write_all(b"Subject: hi\r\n").unwrap();
    data.write_all(b"\r\n.hi").unwrap();
    let response = data.close().unwrap();
    assert!(response.is_positive());
    assert_eq!(session.state(), SessionState::Closing);

    session.quit();
    assert_eq!(session.state(), SessionState::Done);

    let received = server.received();
    assert_eq!(
        received[5],
        Received::Message(b"Subject: hi\r\n\r\n..hi\r\n".to_vec())
    );
    assert_eq!(received.last().unwrap(), &Received::Command("QUIT".to_owned()));
}

#[test]
fn session_steps_out_of_order() {
    let server = MockSmtpServer::builder().start();

    let mut session = Session::connect(&config(server.port(), Security::None)).unwrap();
    assert!(session.mail(None).unwrap_err().is_client());
    assert_eq!(session.state(), SessionState::Greeting);

    session.hello().unwrap();
    assert!(session.hello().unwrap_err().is_client());
    session.mail(None).unwrap();
    assert!(session.data().unwrap_err().is_client());
    assert_eq!(session.state(), SessionState::AddingRecipients(0));

    session.quit();
    assert_eq!(
        server.commands(),
        vec!["EHLO client.test", "MAIL FROM:<> BODY=8BITMIME", "QUIT"]
    );
}

#[test]
fn session_fails_on_rejection() {
    let server = MockSmtpServer::builder()
        .reply("RCPT", "550 5.1.1 No such user")
        .start();

    let mut session = Session::connect(&config(server.port(), Security::None)).unwrap();
    session.hello().unwrap();
    session.mail(Some("sender@example.com")).unwrap();
    assert!(session.rcpt("a@example.com").unwrap_err().is_permanent());
    assert_eq!(session.state(), SessionState::Failed);

    assert!(session.rcpt("b@example.com").unwrap_err().is_client());
    session.quit();
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(server.commands().last().unwrap(), "QUIT");
}

#[test]
fn test_connection() {
    let server = MockSmtpServer::builder().start();

    assert!(SmtpTransport::new(config(server.port(), Security::None))
        .test_connection()
        .unwrap());
    assert_eq!(server.commands(), vec!["EHLO client.test", "QUIT"]);
}

#[test]
fn message_ending_with_crlf_gets_no_extra_line() {
    let server = MockSmtpServer::builder().start();
    let envelope = Envelope::new(
        Some("sender@example.com".to_owned()),
        vec!["a@example.com".to_owned()],
    )
    .unwrap();

    SmtpTransport::new(config(server.port(), Security::None))
        .send_raw(&envelope, b"Subject: hi\r\n\r\nhi\r\n")
        .unwrap();

    assert!(server
        .received()
        .contains(&Received::Message(b"Subject: hi\r\n\r\nhi\r\n".to_vec())));
}

#[test]
fn session_data_ending_with_crlf() {
    let server = MockSmtpServer::builder().start();

    let mut session = Session::connect(&config(server.port(), Security::None)).unwrap();
    session.hello().unwrap();
    session.mail(Some("sender@example.com")).unwrap();
    session.rcpt("a@example.com").unwrap();
    let mut data = session.data().unwrap();
    data.write_all(b"Subject: hi\r").unwrap();
    data.write_all(b"\n\r\n.\r\n").unwrap();
    data.close().unwrap();
    session.quit();

    assert!(server
        .received()
        .contains(&Received::Message(b"Subject: hi\r\n\r\n..\r\n".to_vec())));
}

#[test]
fn tls_delivery() {
    let server = MockSmtpServer::builder()
        .tls()
        .reply("EHLO", "250-mock.test\r\n250-8BITMIME\r\n250 AUTH PLAIN")
        .start();
    let mut config = config(server.port(), Security::Wrapper(tls_options()));
    config.authentication = Some(Authentication::plain("", "user", "pass", "127.0.0.1"));
    let email = message(&["a@example.com", "b@example.com", "c@example.com"]);

    let response = SmtpTransport::new(config).send(&email).unwrap();
    assert_eq!(response.code().to_string(), "250");

    let mut expected_message = email.formatted();
    expected_message.extend_from_slice(b"\r\n");
    assert_eq!(
        server.received(),
        vec![
            Received::Command("EHLO client.test".to_owned()),
            Received::Command("AUTH PLAIN AHVzZXIAcGFzcw==".to_owned()),
            Received::Command("MAIL FROM:<sender@example.com> BODY=8BITMIME".to_owned()),
            Received::Command("RCPT TO:<a@example.com>".to_owned()),
            Received::Command("RCPT TO:<b@example.com>".to_owned()),
            Received::Command("RCPT TO:<c@example.com>".to_owned()),
            Received::Command("DATA".to_owned()),
            Received::Message(expected_message),
            Received::Command("QUIT".to_owned()),
            Received::Encrypted,
        ]
    );
}

#[test]
fn tls_rejected_recipient_stops_delivery() {
    let server = MockSmtpServer::builder()
        .tls()
        .reply("RCPT", "250 OK")
        .reply("RCPT", "550 5.1.1 No such user")
        .start();
    let email = message(&["a@example.com", "b@example.com", "c@example.com"]);

    let err = SmtpTransport::new(config(server.port(), Security::Wrapper(tls_options())))
        .send(&email)
        .unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(err.status().map(u16::from), Some(550));
    assert!(err.to_string().contains("No such user"));

    assert_eq!(
        server.received(),
        vec![
            Received::Command("EHLO client.test".to_owned()),
            Received::Command("MAIL FROM:<sender@example.com> BODY=8BITMIME".to_owned()),
            Received::Command("RCPT TO:<a@example.com>".to_owned()),
            Received::Command("RCPT TO:<b@example.com>".to_owned()),
            Received::Command("QUIT".to_owned()),
            Received::Encrypted,
        ]
    );
}

#[test]
fn tls_session_steps() {
    let server = MockSmtpServer::builder().tls().start();

    let mut session = Session::connect(&config(server.port(), Security::Wrapper(tls_options())))
        .unwrap();
    assert!(session.is_encrypted());
    session.hello().unwrap();
    assert_eq!(session.server_info().name(), "mock.test");
    session.quit();
    assert_eq!(session.state(), SessionState::Done);

    assert_eq!(
        server.received(),
        vec![
            Received::Command("EHLO client.test".to_owned()),
            Received::Command("QUIT".to_owned()),
            Received::Encrypted,
        ]
    );
}

#[test]
fn starttls_delivery() {
    let server = MockSmtpServer::builder().starttls().start();

    SmtpTransport::new(config(server.port(), Security::StartTls(tls_options())))
        .send(&message(&["a@example.com"]))
        .unwrap();

    let received = server.received();
    assert_eq!(
        received[..4],
        [
            Received::Command("EHLO client.test".to_owned()),
            Received::Command("STARTTLS".to_owned()),
            Received::StartedTls,
            // greeted again once encrypted
            Received::Command("EHLO client.test".to_owned()),
        ]
    );
    assert_eq!(
        received[4],
        Received::Command("MAIL FROM:<sender@example.com> BODY=8BITMIME".to_owned())
    );
    assert_eq!(
        received[received.len() - 2..],
        [Received::Command("QUIT".to_owned()), Received::Encrypted]
    );
}
