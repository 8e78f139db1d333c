pub mod element;
pub mod fraction;
pub mod segment_type;
pub mod signature;
