//! Recipients and the plain-text envelope sent over the wire.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// One addressee of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub display_name: String,
    pub address: String,
}

impl Recipient {
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }
}

impl From<&str> for Recipient {
    fn from(address: &str) -> Self {
        Self::new("", address)
    }
}

/// Body format, selects the `Content-Type` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentKind {
    #[default]
    Plain,
    Html,
}

impl ContentKind {
    pub fn header(self) -> &'static str {
        match self {
            Self::Plain => "Content-Type: text/plain; charset=UTF-8",
            Self::Html => "Content-Type: text/html; charset=UTF-8",
        }
    }
}

/// Build the envelope: `To`, `From`, `Subject`, `Content-Type`, a blank
/// line, then the body verbatim.
pub fn build_message(
    from: &Recipient,
    to: &Recipient,
    subject: &str,
    kind: ContentKind,
    body: &str,
) -> Vec<u8> {
    format!(
        "To: {}\r\nFrom: {}\r\nSubject: {}\r\n{}\r\n\r\n{}",
        format_mailbox(to),
        format_mailbox(from),
        encode_header_text(subject),
        kind.header(),
        body,
    )
    .into_bytes()
}

/// Render a mailbox for a header line.
///
/// `<addr>` without a name, `"name" <addr>` for printable ASCII names and
/// an encoded word for anything else.
pub fn format_mailbox(mailbox: &Recipient) -> String {
    let address = &mailbox.address;
    let name = &mailbox.display_name;

    if name.is_empty() {
        return format!("<{address}>");
    }

    if name.chars().all(|c| c == ' ' || c == '\t' || c.is_ascii_graphic()) {
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push('"');
        for c in name.chars() {
            if c == '"' || c == '\\' {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        quoted.push('"');
        return format!("{quoted} <{address}>");
    }

    format!("{} <{address}>", encoded_word(name))
}

/// Leave ASCII text alone and wrap anything else in an RFC 2047 word.
fn encode_header_text(text: &str) -> String {
    if text.is_ascii() {
        text.to_string()
    } else {
        encoded_word(text)
    }
}

fn encoded_word(text: &str) -> String {
    format!("=?utf-8?b?{}?=", BASE64.encode(text))
}
