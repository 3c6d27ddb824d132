#![forbid(unsafe_code)]

mod actor;
mod agent;
mod block;

pub use actor::*;
pub use agent::*;
pub use block::*;

pub mod ids {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(try_from = "String", into = "String")]
    pub struct OrganizationId(String);

    impl OrganizationId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, OrganizationIdError> {
            let value = value.into();
            validate_organization_id(&value)?;
            Ok(Self(value))
        }
    }

    impl TryFrom<String> for OrganizationId {
        type Error = OrganizationIdError;

        fn try_from(value: String) -> Result<Self, Self::Error> {
            Self::try_new(value)
        }
    }

    impl From<OrganizationId> for String {
        fn from(value: OrganizationId) -> Self {
            value.0
        }
    }

    impl std::fmt::Display for OrganizationId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum OrganizationIdError {
        Empty,
        TooLong,
        InvalidFirstChar,
        InvalidChar { ch: char, index: usize },
    }

    impl OrganizationIdError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "organization id must not be empty",
                Self::TooLong => "organization id is too long",
                Self::InvalidFirstChar => "organization id must start with an ascii alphanumeric",
                Self::InvalidChar { .. } => "organization id contains an invalid character",
            }
        }
    }

    impl std::fmt::Display for OrganizationIdError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message())
        }
    }

    fn validate_organization_id(value: &str) -> Result<(), OrganizationIdError> {
        if value.is_empty() {
            return Err(OrganizationIdError::Empty);
        }
        if value.len() > 128 {
            return Err(OrganizationIdError::TooLong);
        }
        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(OrganizationIdError::Empty);
        };
        if !first.is_ascii_alphanumeric() {
            return Err(OrganizationIdError::InvalidFirstChar);
        }
        for (index, ch) in value.chars().enumerate() {
            if index == 0 {
                continue;
            }
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '/' | '-') {
                continue;
            }
            return Err(OrganizationIdError::InvalidChar { ch, index });
        }
        Ok(())
    }

    /// Validation failure shared by the entity id newtypes.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum EntityIdError {
        Empty,
        TooLong,
        ContainsWhitespace,
        ContainsControl,
    }

    impl EntityIdError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "id must not be empty",
                Self::TooLong => "id is too long",
                Self::ContainsWhitespace => "id must not contain whitespace",
                Self::ContainsControl => "id contains control characters",
            }
        }
    }

    impl std::fmt::Display for EntityIdError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message())
        }
    }

    fn validate_entity_id(value: &str) -> Result<(), EntityIdError> {
        if value.is_empty() {
            return Err(EntityIdError::Empty);
        }
        if value.len() > 256 {
            return Err(EntityIdError::TooLong);
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(EntityIdError::ContainsControl);
        }
        if value.chars().any(char::is_whitespace) {
            return Err(EntityIdError::ContainsWhitespace);
        }
        Ok(())
    }

    macro_rules! entity_id {
        ($(#[$meta:meta])* $name:ident) => {
            $(#[$meta])*
            #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(try_from = "String", into = "String")]
            pub struct $name(String);

            impl $name {
                pub fn as_str(&self) -> &str {
                    &self.0
                }

                pub fn try_new(value: impl Into<String>) -> Result<Self, EntityIdError> {
                    let value = value.into();
                    validate_entity_id(&value)?;
                    Ok(Self(value))
                }
            }

            impl TryFrom<String> for $name {
                type Error = EntityIdError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    Self::try_new(value)
                }
            }

            impl From<$name> for String {
                fn from(value: $name) -> Self {
                    value.0
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }
        };
    }

    entity_id!(
        /// Id of a memory block.
        BlockId
    );
    entity_id!(
        /// Id of one checkpoint row in a block's history.
        CheckpointId
    );
    entity_id!(AgentId);
    entity_id!(UserId);
    entity_id!(IdentityId);
}

#[cfg(test)]
mod tests;
