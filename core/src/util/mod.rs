mod fast_map;

pub use fast_map::{FastHashMap, fast_hash_map_new};
