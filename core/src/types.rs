use std::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque string identifiers shared by the job record, the message contract
/// and the blob store. Each one is its own type so a blob handle can never be
/// passed where a job id is expected.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Correlation key between a job record, its request and its completion.
    JobId
);

opaque_id!(
    /// Handle into the external blob store.
    BlobHandle
);

opaque_id!(
    /// Sender or recipient of a job.
    ParticipantRef
);

impl JobId {
    /// Fresh random (v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl BlobHandle {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}
