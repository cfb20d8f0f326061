//! Compose MIME email and deliver it over SMTP.
//!
//! The crate has two halves:
//!
//! * [`message`] renders a [`Message`] into the bytes sent during the SMTP `DATA` phase:
//!   RFC 822 headers followed by a `multipart/mixed` body wrapping a
//!   `multipart/related` and `multipart/alternative` nest and any base64 attachments.
//! * [`transport::smtp`] opens a plaintext, STARTTLS or implicit TLS connection, authenticates
//!   and replays the `MAIL`/`RCPT`/`DATA`/`QUIT` sequence for a single message.
//!
//! ## Example
//!
//! ```rust,no_run
//! use smtp_mailer::{
//!     message::{Content, EmailAddress, Message},
//!     transport::smtp::{authentication::Authentication, Security, SmtpConfig, TlsOptions},
//!     SmtpTransport, Transport,
//! };
//!
//! # use std::error::Error;
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let message = Message {
//!     from: Some(EmailAddress::new(Some("NoBody"), "nobody@domain.tld")),
//!     to: vec!["hei@domain.tld".to_owned()],
//!     subject: "Happy new year".to_owned(),
//!     content: Content::plain("Be happy!"),
//!     ..Default::default()
//! };
//!
//! let mut config = SmtpConfig::new(
//!     "smtp.domain.tld",
//!     465,
//!     Security::Wrapper(TlsOptions::default()),
//! );
//! config.authentication = Some(Authentication::plain(
//!     "",
//!     "username",
//!     "password",
//!     "smtp.domain.tld",
//! ));
//!
//! SmtpTransport::new(config).send(&message)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! * **hostname** (default): use the local host name in `EHLO`
//! * **tracing** (default): log the SMTP exchange with `tracing`
//! * **webpki-roots** (default): trust the Mozilla root certificates
//! * **serde**: `Serialize`/`Deserialize` for plain value types

#![doc(html_root_url = "https://docs.rs/smtp-mailer/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]
#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    rust_2018_idioms,
    clippy::string_add,
    clippy::string_add_assign,
    clippy::clone_on_ref_ptr,
    clippy::verbose_file_reads,
    clippy::unnecessary_self_imports,
    clippy::string_to_string,
    clippy::mem_forget,
    clippy::cast_lossless,
    clippy::inefficient_to_string,
    clippy::inline_always,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::manual_assert,
    clippy::unnecessary_join,
    clippy::wildcard_imports,
    clippy::zero_sized_map_values
)]

pub mod address;
pub mod error;
pub mod message;
mod rustls_crypto;
pub mod transport;

pub use crate::{
    address::{Envelope, RecipientPolicy},
    error::Error,
    message::Message,
    transport::{
        smtp::{SmtpConfig, SmtpTransport},
        Transport,
    },
};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
