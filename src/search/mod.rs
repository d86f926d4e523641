pub mod diversity;
pub mod fulltext;
pub mod hybrid;
pub mod vector;
