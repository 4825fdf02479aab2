//! Helpers shared by the resource handlers
//!
//! - `id` - composite resource IDs
//! - `remarshal` - attribute map <-> DTO conversion
//! - `timeouts` - per-operation timeouts
//! - `helpers` - attribute accessors and small value conversions

pub mod helpers;
pub mod id;
pub mod remarshal;
pub mod timeouts;

pub use helpers::{
    contains_redacted_creds, disk_space_mb, flatten_to_string, get_block, get_bool, get_int,
    get_str, get_tags, human_readable_byte_size, require_str, tags_to_value,
};
pub use id::{build_resource_id, split_resource_id, split2, split3, split4, unescape};
pub use remarshal::{
    MapModifier, rename_aliases, rename_aliases_reverse, resource_data_get, resource_data_set,
    resource_id_keys,
};
pub use timeouts::Timeouts;
