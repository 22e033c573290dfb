pub mod bookmark;
pub mod errors;
pub mod notification;
pub mod session;
pub mod settings;
