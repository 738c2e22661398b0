pub mod init;
pub mod networks;
pub mod peers;
pub mod send;
pub mod status;
