pub mod command;
pub mod decode;
pub mod encode;
pub mod generate;
pub mod info;
pub mod progress;
