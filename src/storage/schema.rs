//! Physical table schema.
//!
//! ```text
//! Table: tempora (configurable)
//!
//! Primary key:
//!   - pk (String, HASH)
//!   - sk (String, RANGE)
//!
//! Items:
//!   meditation  pk = med#{id}   sk = med#{id}   ppk = user   pppk = public|private
//!   sequence    pk = seq#{id}   sk = seq#{id}   ppk = user   pppk = public-seq (public only)
//!   relation    pk = med#{mid}  sk = seq#{sid}
//!
//! Global secondary indexes (projection ALL):
//!   gs1  sk   / pk   reverse membership: relations of a sequence
//!   gs2  ppk  / sk   ownership
//!   gs3  pppk / sk   visibility
//! ```

/// Partition key attribute.
pub const ATTR_PK: &str = "pk";
/// Sort key attribute.
pub const ATTR_SK: &str = "sk";
/// Owner-index partition attribute.
pub const ATTR_OWNER: &str = "ppk";
/// Visibility-index partition attribute.
pub const ATTR_VISIBILITY: &str = "pppk";
/// Record discriminator.
pub const ATTR_KIND: &str = "kind";
/// Optimistic-concurrency stamp (RFC3339, fixed precision, UTC).
pub const ATTR_LAST_MODIFIED: &str = "last_modified";

/// Key prefix for meditation ids.
pub const MEDITATION_PREFIX: &str = "med#";
/// Key prefix for sequence ids.
pub const SEQUENCE_PREFIX: &str = "seq#";

/// Visibility key of a public meditation.
pub const VISIBILITY_PUBLIC: &str = "public";
/// Visibility key of a private meditation.
pub const VISIBILITY_PRIVATE: &str = "private";
/// Visibility key of a public sequence. Private sequences carry none.
pub const VISIBILITY_PUBLIC_SEQUENCE: &str = "public-seq";

/// Largest number of keys a single BatchGetItem accepts.
pub const MAX_BATCH_GET: usize = 100;
/// Largest number of requests a single BatchWriteItem accepts.
pub const MAX_BATCH_WRITE: usize = 25;

/// The indexes a query can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    /// The table's own `pk`/`sk` key.
    Primary,
    /// `gs1`: `sk` / `pk`.
    ReverseMembership,
    /// `gs2`: `ppk` / `sk`.
    Owner,
    /// `gs3`: `pppk` / `sk`.
    Visibility,
}

impl Index {
    /// Every index, table key first.
    pub const ALL: [Index; 4] = [
        Index::Primary,
        Index::ReverseMembership,
        Index::Owner,
        Index::Visibility,
    ];

    /// GSI name, `None` for the table key.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Index::Primary => None,
            Index::ReverseMembership => Some("gs1"),
            Index::Owner => Some("gs2"),
            Index::Visibility => Some("gs3"),
        }
    }

    /// Attribute used as the index partition key.
    pub fn partition_attr(self) -> &'static str {
        match self {
            Index::Primary => ATTR_PK,
            Index::ReverseMembership => ATTR_SK,
            Index::Owner => ATTR_OWNER,
            Index::Visibility => ATTR_VISIBILITY,
        }
    }

    /// Attribute used as the index sort key.
    pub fn sort_attr(self) -> &'static str {
        match self {
            Index::Primary => ATTR_SK,
            Index::ReverseMembership => ATTR_PK,
            Index::Owner => ATTR_SK,
            Index::Visibility => ATTR_SK,
        }
    }

    /// Strongly consistent reads are only served by the table key; GSIs
    /// reject them.
    pub fn supports_consistent_read(self) -> bool {
        self == Index::Primary
    }
}
