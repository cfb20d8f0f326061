use std::fmt::{Display, Formatter, Result as FmtResult, Write};

/// Represents an email address with an optional name for the sender/recipient.
///
/// Displays as _"Some Name" \<user@domain.tld\>_, or _user@domain.tld_ when there is no name.
///
/// The address is not validated.
///
/// # Examples
///
/// ```
/// # use smtp_mailer::message::EmailAddress;
/// let named = EmailAddress::new(Some("John Smith"), "example@email.com");
/// assert_eq!(named.to_string(), "\"John Smith\" <example@email.com>");
///
/// let bare = EmailAddress::new(None::<String>, "example@email.com");
/// assert_eq!(bare.to_string(), "example@email.com");
/// ```
#[derive(Debug, Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmailAddress {
    /// The name associated with the address.
    pub name: Option<String>,

    /// The email address itself.
    pub address: String,
}

impl EmailAddress {
    /// Creates a new `EmailAddress` using an address and the name of the recipient if there is one.
    pub fn new<N: Into<String>, A: Into<String>>(name: Option<N>, address: A) -> Self {
        EmailAddress {
            name: name.map(Into::into),
            address: address.into(),
        }
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if let Some(name) = &self.name {
            let name = name.trim();
            if !name.is_empty() {
                // Quoted string: https://datatracker.ietf.org/doc/html/rfc2822#section-3.2.5
                f.write_char('"')?;
                for c in name.chars() {
                    write_quoted_string_char(f, c)?;
                }
                f.write_str("\" <")?;
                f.write_str(&self.address)?;
                return f.write_char('>');
            }
        }
        f.write_str(&self.address)
    }
}

impl From<String> for EmailAddress {
    fn from(address: String) -> Self {
        Self::new(None::<String>, address)
    }
}

impl From<&str> for EmailAddress {
    fn from(address: &str) -> Self {
        Self::new(None::<String>, address)
    }
}

fn write_quoted_string_char(f: &mut Formatter<'_>, c: char) -> FmtResult {
    match c {
        // Can not be encoded, dropped.
        '\n' | '\r' => Ok(()),

        // Note, not qcontent but can be escaped.
        '"' | '\\' => {
            f.write_char('\\')?;
            f.write_char(c)
        }

        _ => f.write_char(c),
    }
}
