//! Username type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Username`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    /// The input string is empty.
    #[error("username cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("username must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input starts or ends with whitespace.
    #[error("username cannot start or end with whitespace")]
    SurroundingWhitespace,
    /// The input contains a control character.
    #[error("username cannot contain control characters")]
    ControlCharacter,
}

/// An account username.
///
/// Usernames are the unique key of a credential record. They are compared
/// exactly: no case folding and no Unicode normalization.
///
/// ## Constraints
///
/// - Length: 1-64 characters
/// - No leading or trailing whitespace
/// - No control characters
///
/// Sign-up applies a stricter length limit on top of these (see
/// [`Username::SIGNUP_MAX_LENGTH`]); records created elsewhere may be longer.
///
/// ## Examples
///
/// ```
/// use studydesk_core::Username;
///
/// assert!(Username::parse("alice").is_ok());
/// assert!(Username::parse("Alice Smith").is_ok());
///
/// assert!(Username::parse("").is_err());        // empty
/// assert!(Username::parse(" alice").is_err());  // leading whitespace
/// assert!(Username::parse("al\nice").is_err()); // control character
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Maximum length of any stored username, in characters.
    pub const MAX_LENGTH: usize = 64;

    /// Maximum length accepted by the sign-up form, in characters.
    pub const SIGNUP_MAX_LENGTH: usize = 15;

    /// Parse a `Username` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input:
    /// - Is empty
    /// - Is longer than 64 characters
    /// - Starts or ends with whitespace
    /// - Contains a control character
    pub fn parse(s: &str) -> Result<Self, UsernameError> {
        if s.is_empty() {
            return Err(UsernameError::Empty);
        }

        if s.chars().count() > Self::MAX_LENGTH {
            return Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if s.trim() != s {
            return Err(UsernameError::SurroundingWhitespace);
        }

        if s.chars().any(char::is_control) {
            return Err(UsernameError::ControlCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Parse a username submitted through the sign-up form.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Username::parse`], and
    /// `UsernameError::TooLong` for names over
    /// [`Username::SIGNUP_MAX_LENGTH`] characters.
    pub fn parse_for_signup(s: &str) -> Result<Self, UsernameError> {
        let username = Self::parse(s)?;
        if username.0.chars().count() > Self::SIGNUP_MAX_LENGTH {
            return Err(UsernameError::TooLong {
                max: Self::SIGNUP_MAX_LENGTH,
            });
        }
        Ok(username)
    }

    /// Returns the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Username` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Username {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Username {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Username {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
