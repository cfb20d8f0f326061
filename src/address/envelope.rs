use crate::{message::Message, Error};

/// Which message recipients end up in the envelope (`RCPT TO`)
///
/// Only envelope recipients actually receive the message. Header recipients
/// (`Cc`, `Bcc`) that are not in the envelope are merely *addressed*.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecipientPolicy {
    /// Only the `To` list is used, `Cc` and `Bcc` only appear in headers
    #[default]
    ToOnly,
    /// `To`, then `Cc`, then `Bcc`, without duplicates
    All,
}

/// Simple email envelope representation
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    /// The envelope recipients' addresses
    ///
    /// This can not be empty.
    forward_path: Vec<String>,
    /// The envelope sender address
    reverse_path: Option<String>,
}

impl Envelope {
    /// Creates a new envelope, which may fail if `to` is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// # use smtp_mailer::address::Envelope;
    /// # use std::error::Error;
    /// # fn main() -> Result<(), Box<dyn Error>> {
    /// let envelope = Envelope::new(
    ///     Some("from@email.com".to_owned()),
    ///     vec!["to@email.com".to_owned()],
    /// )?;
    /// assert_eq!(envelope.to(), ["to@email.com"]);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// If `to` has no elements in it, or if an address contains CR or LF.
    pub fn new(from: Option<String>, to: Vec<String>) -> Result<Envelope, Error> {
        if to.is_empty() {
            return Err(Error::MissingTo);
        }
        if from.iter().chain(to.iter()).any(|a| a.contains(['\r', '\n'])) {
            return Err(Error::InvalidAddress);
        }
        Ok(Envelope {
            forward_path: to,
            reverse_path: from,
        })
    }

    /// Builds the envelope of a message
    ///
    /// The sender is the address part of `From`, the recipients are selected
    /// by `policy`.
    ///
    /// # Errors
    ///
    /// If the message has no `From`, or if the selected recipient list is empty.
    pub fn from_message(message: &Message, policy: RecipientPolicy) -> Result<Envelope, Error> {
        let from = message
            .from
            .as_ref()
            .map(|mailbox| mailbox.address.clone())
            .ok_or(Error::MissingFrom)?;

        let to = match policy {
            RecipientPolicy::ToOnly => message.to.clone(),
            RecipientPolicy::All => {
                let mut to: Vec<String> = Vec::new();
                for address in message.to.iter().chain(&message.cc).chain(&message.bcc) {
                    if !to.contains(address) {
                        to.push(address.clone());
                    }
                }
                to
            }
        };

        Self::new(Some(from), to)
    }

    /// Gets the destination addresses of the envelope.
    pub fn to(&self) -> &[String] {
        self.forward_path.as_slice()
    }

    /// Gets the sender of the envelope.
    pub fn from(&self) -> Option<&str> {
        self.reverse_path.as_deref()
    }
}
