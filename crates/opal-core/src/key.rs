//! Object identity: `(namespace, type tag, id)` triples.
//!
//! The triple is the unique identity of a replicated object; two keys
//! differing only in their type tag name different objects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The registered CRDT types an object key can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// Operation-based positive-negative counter.
    CounterOb,
    /// State-based positive-negative counter.
    CounterSb,
    /// Add-wins (observed-remove) set.
    AwSet,
    /// Two-phase set.
    TpSet,
    /// Multi-value register.
    MvReg,
    /// Enable-wins flag.
    EwFlag,
}

impl TypeTag {
    /// The wire name of this tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::CounterOb => "pn-counter-ob",
            TypeTag::CounterSb => "pn-counter-sb",
            TypeTag::AwSet => "aw-set",
            TypeTag::TpSet => "tp-set",
            TypeTag::MvReg => "mv-reg",
            TypeTag::EwFlag => "ew-flag",
        }
    }

    /// Resolve a wire name to a tag. Unknown names resolve to `None`;
    /// callers surface that as an unknown-type error.
    pub fn parse(name: &str) -> Option<TypeTag> {
        match name {
            "pn-counter-ob" => Some(TypeTag::CounterOb),
            "pn-counter-sb" => Some(TypeTag::CounterSb),
            "aw-set" => Some(TypeTag::AwSet),
            "tp-set" => Some(TypeTag::TpSet),
            "mv-reg" => Some(TypeTag::MvReg),
            "ew-flag" => Some(TypeTag::EwFlag),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of a replicated object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace bytes, typically a short UTF-8 label.
    pub namespace: Vec<u8>,
    /// The CRDT type this object is an instance of.
    pub tag: TypeTag,
    /// Object id bytes within the namespace.
    pub id: Vec<u8>,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<Vec<u8>>, tag: TypeTag, id: impl Into<Vec<u8>>) -> Self {
        ObjectKey {
            namespace: namespace.into(),
            tag,
            id: id.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            String::from_utf8_lossy(&self.namespace),
            self.tag,
            String::from_utf8_lossy(&self.id)
        )
    }
}
