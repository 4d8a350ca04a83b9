//! In-memory index structures and their on-disk forms.

pub mod btrie;
pub mod skipindex;
pub mod skiplist;
