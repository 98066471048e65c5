//! Profile document parsing and serialization.

pub mod profile_xml;
pub mod writer;

pub use profile_xml::{parse_profile, parse_profile_str};
pub use writer::write_profile;
