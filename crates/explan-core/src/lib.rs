#![deny(missing_docs)]
#![doc = "Core error, modality and hashing types shared by the explan crates."]

pub mod errors;
pub mod hash;
pub mod modality;
/// Canonical JSON and YAML serde helpers.
pub mod serde;

pub use errors::{ErrorInfo, ExplanError};
pub use hash::{digest128_hex, memo_key, stable_hash_string};
pub use modality::{Modality, ModalityKind};
pub use crate::serde::{from_json_slice, from_yaml_slice, to_canonical_json_bytes, to_yaml_string};
