//! Validated message fields.
//!
//! Every text field that travels on the wire is wrapped in a newtype whose
//! only constructor runs the field's validator. Once you hold a
//! [`DisplayName`], it is guaranteed to be 1–20 printable characters without
//! spaces; the codecs and the session never re-check it.
//!
//! | Field | Max length | Allowed characters |
//! |---|---|---|
//! | [`Username`] | 20 | `A-Z a-z 0-9 - .` |
//! | [`ChannelId`] | 20 | `A-Z a-z 0-9 - .` |
//! | [`Secret`] | 128 | `A-Z a-z 0-9 - .` |
//! | [`DisplayName`] | 20 | printable `0x21-0x7E` |
//! | [`Content`] | 1400 | printable with space `0x20-0x7E` |

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

fn is_visible_char(c: char) -> bool {
    ('\x21'..='\x7e').contains(&c)
}

fn is_printable_char(c: char) -> bool {
    ('\x20'..='\x7e').contains(&c)
}

/// Shared validator: non-empty, at most `max` characters, every character in
/// the class.
fn check(value: &str, max: usize, class: fn(char) -> bool) -> bool {
    !value.is_empty() && value.len() <= max && value.chars().all(class)
}

macro_rules! validated_field {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal, $max:expr, $class:path, $expected:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Maximum length in characters.
            pub const MAX_LEN: usize = $max;

            /// Validates `value` and wraps it.
            ///
            /// # Errors
            /// Returns [`ProtocolError::InvalidField`] if the value is empty,
            /// too long, or contains a character outside the allowed class.
            pub fn new(value: impl Into<String>) -> Result<Self, ProtocolError> {
                let value = value.into();
                if check(&value, $max, $class) {
                    Ok(Self(value))
                } else {
                    Err(ProtocolError::InvalidField {
                        field: $label,
                        expected: $expected,
                        got: value,
                    })
                }
            }

            /// Returns the field as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the field and returns the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ProtocolError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

validated_field!(
    /// A login name, unique among logged-in users.
    Username, "Username", 20, is_id_char, "1-20 characters from [A-Za-z0-9-.]"
);

validated_field!(
    /// The name of a channel, e.g. `general`.
    ChannelId, "ChannelID", 20, is_id_char, "1-20 characters from [A-Za-z0-9-.]"
);

validated_field!(
    /// The login secret. Any syntactically valid secret is accepted.
    Secret, "Secret", 128, is_id_char, "1-128 characters from [A-Za-z0-9-.]"
);

validated_field!(
    /// The human-readable name shown next to a user's messages.
    DisplayName, "DisplayName", 20, is_visible_char,
    "1-20 printable characters (0x21-0x7E) without space"
);

validated_field!(
    /// The text body of a MSG, ERR or REPLY message.
    Content, "MessageContent", 1400, is_printable_char,
    "1-1400 printable characters (0x20-0x7E)"
);

impl DisplayName {
    /// The display name the server uses for its own messages.
    pub fn server() -> Self {
        Self(crate::SERVER_DISPLAY_NAME.to_string())
    }
}

impl Content {
    /// Builds content from arbitrary text, replacing characters outside the
    /// printable class with `?` and cutting it to [`Content::MAX_LEN`].
    pub fn lossy(text: &str) -> Self {
        let mut value: String = text
            .chars()
            .map(|c| if is_printable_char(c) { c } else { '?' })
            .take(Self::MAX_LEN)
            .collect();
        if value.is_empty() {
            value.push('?');
        }
        Self(value)
    }
}

impl ChannelId {
    /// The default channel, `general`.
    pub fn general() -> Self {
        Self(crate::DEFAULT_CHANNEL.to_string())
    }
}
