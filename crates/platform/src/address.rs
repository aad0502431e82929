//! Identities on the platform, rendered as `user@server`.

use std::{fmt, str::FromStr};

/// Which namespace an address lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressServer {
    Individual,
    Group,
    Broadcast,
    Newsletter,
}

impl AddressServer {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
            Self::Broadcast => "broadcast",
            Self::Newsletter => "newsletter",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "individual" => Some(Self::Individual),
            "group" => Some(Self::Group),
            "broadcast" => Some(Self::Broadcast),
            "newsletter" => Some(Self::Newsletter),
            _ => None,
        }
    }
}

impl fmt::Display for AddressServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address has no user part: {input}")]
    MissingUser { input: String },

    #[error("address has no server part: {input}")]
    MissingServer { input: String },

    #[error("unknown address server: {server}")]
    UnknownServer { server: String },
}

/// A chat or contact identity. Parsing is total: malformed input yields an
/// [`AddressError`], never a partially-built value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatAddress {
    user: String,
    server: AddressServer,
}

impl ChatAddress {
    pub fn new(user: impl Into<String>, server: AddressServer) -> Result<Self, AddressError> {
        let user = user.into();
        if user.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self { user, server })
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn server(&self) -> AddressServer {
        self.server
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        self.server == AddressServer::Group
    }
}

impl fmt::Display for ChatAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

impl FromStr for ChatAddress {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err(AddressError::Empty);
        }
        let (user, server) = input.rsplit_once('@').ok_or(AddressError::MissingServer {
            input: input.to_string(),
        })?;
        if user.is_empty() {
            return Err(AddressError::MissingUser {
                input: input.to_string(),
            });
        }
        let server = AddressServer::parse(server).ok_or(AddressError::UnknownServer {
            server: server.to_string(),
        })?;
        Ok(Self {
            user: user.to_string(),
            server,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_render_round_trips() {
        for input in [
            "15550001111@individual",
            "team-chat-9@group",
            "status@broadcast",
            "daily-news@newsletter",
        ] {
            let addr: ChatAddress = input.parse().unwrap();
            assert_eq!(addr.to_string(), input);
            assert_eq!(addr.to_string().parse::<ChatAddress>().unwrap(), addr);
        }
    }

    #[test]
    fn user_may_contain_at_signs() {
        let addr: ChatAddress = "odd@user@individual".parse().unwrap();
        assert_eq!(addr.user(), "odd@user");
        assert_eq!(addr.server(), AddressServer::Individual);
    }

    #[test]
    fn malformed_input_yields_typed_errors() {
        assert_eq!("".parse::<ChatAddress>(), Err(AddressError::Empty));
        assert!(matches!(
            "no-server".parse::<ChatAddress>(),
            Err(AddressError::MissingServer { .. })
        ));
        assert!(matches!(
            "@individual".parse::<ChatAddress>(),
            Err(AddressError::MissingUser { .. })
        ));
        assert!(matches!(
            "123@planet".parse::<ChatAddress>(),
            Err(AddressError::UnknownServer { .. })
        ));
    }

    #[test]
    fn group_detection() {
        assert!("x@group".parse::<ChatAddress>().unwrap().is_group());
        assert!(!"x@individual".parse::<ChatAddress>().unwrap().is_group());
    }
}
