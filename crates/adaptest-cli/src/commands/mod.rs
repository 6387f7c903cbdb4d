pub mod init;
pub mod score;
pub mod simulate;
pub mod validate;
