use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

// Identifiers on this side of the wire are opaque strings minted by the backend.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a background job whose progress is streamed to the client.
    JobId
);

string_id!(
    /// Identifier of one chunk of a job.
    ChunkId
);

string_id!(
    /// Identifier of a review item. Item equality is defined by this id alone.
    ItemId
);

string_id!(
    /// Identifier of the resource (deck, document, course) a practice pool draws from.
    ResourceId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_job_id_display() {
        let id = JobId::new("job-42");
        assert_eq!(id.to_string(), "job-42");
    }

    #[test]
    fn test_item_id_debug_names_type() {
        let id = ItemId::from("abc");
        assert_eq!(format!("{id:?}"), "ItemId(\"abc\")");
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ResourceId::new("deck-7")).unwrap();
        assert_eq!(json, "\"deck-7\"");
        let back: ResourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "deck-7");
    }

    #[test]
    fn test_hash_set_lookup_by_str() {
        let mut set = HashSet::new();
        set.insert(ItemId::new("i-1"));
        assert!(set.contains("i-1"));
        assert!(!set.contains("i-2"));
    }
}
