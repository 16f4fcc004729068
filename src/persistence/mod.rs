//! Persistence module
//!
//! Patch fragments for the clipboard and for save/load, using serde and JSON.

pub mod fragment;

pub use fragment::{
    load_from_file, save_to_file, ConnectionRecord, FragmentError, ObjectRecord, PatchFragment,
    FRAGMENT_VERSION,
};
