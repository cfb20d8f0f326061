//! SMTP envelope addressing

mod envelope;

pub use self::envelope::{Envelope, RecipientPolicy};
