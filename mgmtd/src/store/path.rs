//! Resource paths into a configuration tree.
//!
//! Paths are slash separated and relative to the data root:
//! `subscribers`, `subscribers/{imsi}`, `network-functions/amf`,
//! `network-functions/amf/{id}`.

use std::fmt;
use std::str::FromStr;

use crate::model::NfType;

use super::error::StoreError;

/// Top-level collections of the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    NetworkFunctions,
    Subscribers,
    Sessions,
    QosProfiles,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::NetworkFunctions,
        Collection::Subscribers,
        Collection::Sessions,
        Collection::QosProfiles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::NetworkFunctions => "network-functions",
            Collection::Subscribers => "subscribers",
            Collection::Sessions => "sessions",
            Collection::QosProfiles => "qos-profiles",
        }
    }

    /// Name of the key leaf identifying an entry.
    pub fn key_leaf(&self) -> &'static str {
        match self {
            Collection::NetworkFunctions | Collection::QosProfiles => "id",
            Collection::Subscribers => "imsi",
            Collection::Sessions => "session-id",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| StoreError::NotFound(format!("unknown collection '{}'", s)))
    }
}

/// Identifies exactly one entry in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKey {
    NetworkFunction(NfType, String),
    Subscriber(String),
    Session(String),
    QosProfile(String),
}

impl EntryKey {
    pub fn collection(&self) -> Collection {
        match self {
            EntryKey::NetworkFunction(..) => Collection::NetworkFunctions,
            EntryKey::Subscriber(_) => Collection::Subscribers,
            EntryKey::Session(_) => Collection::Sessions,
            EntryKey::QosProfile(_) => Collection::QosProfiles,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntryKey::NetworkFunction(_, id)
            | EntryKey::Subscriber(id)
            | EntryKey::Session(id)
            | EntryKey::QosProfile(id) => id,
        }
    }

    /// Build a key from a collection (plus NF type) and an id.
    pub fn new(collection: Collection, nf_type: Option<NfType>, id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(StoreError::InvalidEdit(format!(
                "empty {} in {}",
                collection.key_leaf(),
                collection
            )));
        }
        Ok(match collection {
            Collection::NetworkFunctions => {
                let nf_type = nf_type.ok_or_else(|| {
                    StoreError::InvalidEdit(format!("network function '{}' has no type", id))
                })?;
                EntryKey::NetworkFunction(nf_type, id)
            }
            Collection::Subscribers => EntryKey::Subscriber(id),
            Collection::Sessions => EntryKey::Session(id),
            Collection::QosProfiles => EntryKey::QosProfile(id),
        })
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::NetworkFunction(t, id) => write!(f, "network-functions/{}/{}", t.segment(), id),
            other => write!(f, "{}/{}", other.collection(), other.id()),
        }
    }
}

/// A resolved path: the whole tree, a collection, one NF type collection or
/// a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPath {
    Root,
    Collection(Collection),
    NfType(NfType),
    Entry(EntryKey),
}

impl DataPath {
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let not_found = || StoreError::NotFound(format!("path '{}' does not resolve", path));

        match segments.as_slice() {
            [] => Ok(DataPath::Root),
            [collection] => Ok(DataPath::Collection(collection.parse()?)),
            ["network-functions", nf_type] => Ok(DataPath::NfType(
                nf_type.parse().map_err(|_| not_found())?,
            )),
            ["network-functions", nf_type, id] => Ok(DataPath::Entry(EntryKey::NetworkFunction(
                nf_type.parse().map_err(|_| not_found())?,
                id.to_string(),
            ))),
            [collection, id] => {
                let collection: Collection = collection.parse()?;
                Ok(DataPath::Entry(EntryKey::new(collection, None, *id)?))
            }
            _ => Err(not_found()),
        }
    }
}

impl From<EntryKey> for DataPath {
    fn from(key: EntryKey) -> Self {
        DataPath::Entry(key)
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataPath::Root => f.write_str("/"),
            DataPath::Collection(c) => write!(f, "{}", c),
            DataPath::NfType(t) => write!(f, "network-functions/{}", t.segment()),
            DataPath::Entry(key) => write!(f, "{}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root_and_collections() {
        assert_eq!(DataPath::parse("").unwrap(), DataPath::Root);
        assert_eq!(DataPath::parse("/").unwrap(), DataPath::Root);
        assert_eq!(
            DataPath::parse("qos-profiles").unwrap(),
            DataPath::Collection(Collection::QosProfiles)
        );
        assert_eq!(
            DataPath::parse("/network-functions/smf").unwrap(),
            DataPath::NfType(NfType::Smf)
        );
    }

    #[test]
    fn test_parse_entries() {
        assert_eq!(
            DataPath::parse("subscribers/001010000000001").unwrap(),
            DataPath::Entry(EntryKey::Subscriber("001010000000001".into()))
        );
        assert_eq!(
            DataPath::parse("network-functions/upf/upf-1").unwrap(),
            DataPath::Entry(EntryKey::NetworkFunction(NfType::Upf, "upf-1".into()))
        );
    }

    #[test]
    fn test_parse_unknown_is_not_found() {
        assert!(matches!(DataPath::parse("routers"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            DataPath::parse("network-functions/mme"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            DataPath::parse("sessions/a/b"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_entry_key_display_roundtrip() {
        let key = EntryKey::NetworkFunction(NfType::Amf, "amf-1".into());
        assert_eq!(key.to_string(), "network-functions/amf/amf-1");
        assert_eq!(DataPath::parse(&key.to_string()).unwrap(), DataPath::Entry(key));
    }
}
