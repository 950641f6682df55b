//! Open-set enums for the domain model.
//!
//! Each enum has:
//! - Custom Serialize (as kebab-case string)
//! - Custom Deserialize (known variants + catch-all Custom(String))
//! - `as_str()`, `is_builtin()`, `Display` impl

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident, custom_variant = $custom_variant:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
            $custom_variant(String),
        }

        impl $name {
            /// Returns the string representation.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $str, )+
                    Self::$custom_variant(s) => s.as_str(),
                }
            }

            /// Returns `true` if this is the default variant.
            pub fn is_default(&self) -> bool {
                *self == Self::$default
            }

            /// Returns `true` if this is a known (non-custom) variant.
            pub fn is_builtin(&self) -> bool {
                !matches!(self, Self::$custom_variant(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::from(s.as_str()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $( $str => Self::$variant, )+
                    other => Self::$custom_variant(other.to_owned()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $( $str => Self::$variant, )+
                    _ => Self::$custom_variant(s),
                }
            }
        }
    };
}

define_enum! {
    /// Relationship kind between two issues. Open set: well-known variants
    /// plus a `Custom` fallback for anything the remote tracker reports that
    /// isn't one of them.
    RelationshipKind, default = RelatesTo, custom_variant = Custom,
    variants: [
        (EpicParent, "epic-parent"),
        (Subtask, "subtask"),
        (Blocks, "blocks"),
        (BlockedBy, "blocked-by"),
        (Clones, "clones"),
        (ClonedBy, "cloned-by"),
        (RelatesTo, "relates-to"),
        (Causes, "causes"),
        (CausedBy, "caused-by"),
        (Duplicates, "duplicates"),
        (DuplicatedBy, "duplicated-by"),
    ]
}

impl RelationshipKind {
    /// The inverse kind for a semantic inverse pair, if one exists.
    ///
    /// `None` for kinds with no defined inverse (e.g. `relates-to` is its
    /// own inverse; custom kinds have no known inverse).
    pub fn inverse(&self) -> Option<Self> {
        match self {
            Self::Blocks => Some(Self::BlockedBy),
            Self::BlockedBy => Some(Self::Blocks),
            Self::Clones => Some(Self::ClonedBy),
            Self::ClonedBy => Some(Self::Clones),
            Self::Causes => Some(Self::CausedBy),
            Self::CausedBy => Some(Self::Causes),
            Self::Duplicates => Some(Self::DuplicatedBy),
            Self::DuplicatedBy => Some(Self::Duplicates),
            Self::RelatesTo => Some(Self::RelatesTo),
            Self::EpicParent | Self::Subtask | Self::Custom(_) => None,
        }
    }

    /// `true` iff this kind participates in a semantic inverse pair (i.e.
    /// reconciliation must pick a single authoritative direction for it).
    pub fn is_inverse_pair(&self) -> bool {
        matches!(
            self,
            Self::Blocks
                | Self::BlockedBy
                | Self::Clones
                | Self::ClonedBy
                | Self::Causes
                | Self::CausedBy
                | Self::Duplicates
                | Self::DuplicatedBy
        )
    }
}
