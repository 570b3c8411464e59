//! Key codec.
//!
//! Pure mapping from logical entities to physical keys and index attributes.
//! Four logical indexes share one table:
//!
//! - primary: `med#{id}` / `seq#{id}` point items
//! - ownership (`gs2`): `ppk` = owning user
//! - visibility (`gs3`): `pppk` = `public` | `private` | `public-seq`
//! - reverse membership: relation items `med#{mid}` / `seq#{sid}`, read from
//!   the table key for "sequences containing X" and from `gs1` for "relations
//!   of sequence Y"

use super::schema::{
    MEDITATION_PREFIX, SEQUENCE_PREFIX, VISIBILITY_PRIVATE, VISIBILITY_PUBLIC,
    VISIBILITY_PUBLIC_SEQUENCE,
};
use super::table::PrimaryKey;
use super::{Result, StorageError};

/// Physical key plus secondary-index attributes for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    pub key: PrimaryKey,
    pub owner: Option<String>,
    pub visibility: Option<String>,
}

/// `med#{id}`.
pub fn meditation_pk(id: &str) -> String {
    format!("{}{}", MEDITATION_PREFIX, id)
}

/// `seq#{id}`.
pub fn sequence_pk(id: &str) -> String {
    format!("{}{}", SEQUENCE_PREFIX, id)
}

/// Primary key of a meditation item.
pub fn meditation_key(id: &str) -> PrimaryKey {
    let pk = meditation_pk(id);
    PrimaryKey::new(pk.clone(), pk)
}

/// Primary key of a sequence item.
pub fn sequence_key(id: &str) -> PrimaryKey {
    let pk = sequence_pk(id);
    PrimaryKey::new(pk.clone(), pk)
}

/// Primary key of the relation "meditation belongs to sequence".
pub fn relation_key(meditation_id: &str, sequence_id: &str) -> PrimaryKey {
    PrimaryKey::new(meditation_pk(meditation_id), sequence_pk(sequence_id))
}

/// Keys of a meditation item.
pub fn meditation_keys(id: &str, user_id: &str, public: bool) -> KeySet {
    let visibility = if public {
        VISIBILITY_PUBLIC
    } else {
        VISIBILITY_PRIVATE
    };
    KeySet {
        key: meditation_key(id),
        owner: Some(user_id.to_string()),
        visibility: Some(visibility.to_string()),
    }
}

/// Keys of a sequence item. Private sequences stay out of the visibility
/// index.
pub fn sequence_keys(id: &str, user_id: &str, public: bool) -> KeySet {
    KeySet {
        key: sequence_key(id),
        owner: Some(user_id.to_string()),
        visibility: public.then(|| VISIBILITY_PUBLIC_SEQUENCE.to_string()),
    }
}

/// Keys of a relation item. Relations appear in no listing index.
pub fn relation_keys(meditation_id: &str, sequence_id: &str) -> KeySet {
    KeySet {
        key: relation_key(meditation_id, sequence_id),
        owner: None,
        visibility: None,
    }
}

/// Meditation id of a relation key, `None` if the key is not a relation.
pub fn relation_meditation_id(key: &PrimaryKey) -> Option<&str> {
    if !key.sk.starts_with(SEQUENCE_PREFIX) {
        return None;
    }
    key.pk.strip_prefix(MEDITATION_PREFIX)
}

/// Reject identifiers the codec cannot encode.
pub fn validate_id(kind: &'static str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StorageError::InvalidInput(format!("empty {} id", kind)));
    }
    Ok(())
}
