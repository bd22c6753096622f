use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender id the server uses for messages written by the current user.
pub const CURRENT_USER: &str = "you";

const PLACEHOLDER_PREFIX: &str = "local-";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(MessageId);
id_newtype!(ParticipantId);
id_newtype!(SessionId);

impl MessageId {
    /// Fresh id for an optimistic send that the server has not confirmed yet.
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }
}

impl ParticipantId {
    pub fn current_user() -> Self {
        Self(CURRENT_USER.to_string())
    }

    pub fn is_current_user(&self) -> bool {
        self.0 == CURRENT_USER
    }
}
