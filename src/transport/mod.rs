//! ### Sending Messages
//!
//! A transport delivers a formatted [`Message`]. The only one available is
//! [`SmtpTransport`](smtp::SmtpTransport), which uses the SMTP protocol to
//! send the message over the network.

use crate::{
    address::{Envelope, RecipientPolicy},
    Message,
};

pub mod smtp;

/// Blocking Transport method for emails
pub trait Transport {
    /// Response produced by the Transport
    type Ok;
    /// Error produced by the Transport
    type Error: From<crate::Error>;

    /// Which message recipients become envelope recipients
    fn recipient_policy(&self) -> RecipientPolicy {
        RecipientPolicy::default()
    }

    /// Sends the email
    ///
    /// The envelope is built from the message, nothing is sent if it has no
    /// sender or no recipient.
    fn send(&self, message: &Message) -> Result<Self::Ok, Self::Error> {
        let envelope = Envelope::from_message(message, self.recipient_policy())?;
        let raw = message.formatted();
        self.send_raw(&envelope, &raw)
    }

    /// Sends already formatted bytes to the envelope recipients
    fn send_raw(&self, envelope: &Envelope, email: &[u8]) -> Result<Self::Ok, Self::Error>;
}
