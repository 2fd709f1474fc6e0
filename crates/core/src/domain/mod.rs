pub mod analysis;
pub mod contact;
pub mod conversation;
pub mod genre;
pub mod profile;
