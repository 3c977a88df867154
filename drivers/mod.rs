//! Remote drive clients / 云盘客户端

pub mod google_drive;
