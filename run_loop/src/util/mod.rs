mod owner_bound;

pub use owner_bound::*;
