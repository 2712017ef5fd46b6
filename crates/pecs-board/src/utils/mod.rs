pub mod checksum;
pub mod human_format;

pub use checksum::sha256_hex;
pub use human_format::format_memory;
