//! Records owned by the contract core and the fixed value sets they use.

/// Declares a closed set of values with a stable wire/storage string each.
///
/// Generates `ALL`, `as_str`, `Display`, `FromStr` (unknown strings are a
/// `ContractError::Validation`) and serde impls that use the same strings.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::ContractError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err($crate::error::ContractError::Validation(format!(
                        "'{}' is not a valid {}",
                        other, $kind
                    ))),
                }
            }
        }
    };
}

/// `deserialize_with` for `Option<Option<T>>` patch fields. Paired with
/// `#[serde(default)]`: a missing key stays `None`, an explicit `null` is
/// `Some(None)`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    <Option<T> as serde::Deserialize>::deserialize(deserializer).map(Some)
}

pub mod contract;
pub mod records;
pub mod status;
pub mod terms;
pub mod user;

pub use contract::{Contract, ContractPatch, ContractType, NewContract};
pub use records::{Comment, ContractDocument, StatusHistory};
pub use status::ContractStatus;
pub use terms::{PaymentTerms, RenewalTerms};
pub use user::{Department, NewUser, Role, User, UserPatch};
