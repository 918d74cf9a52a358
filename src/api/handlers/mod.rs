pub mod health;
pub mod home;
pub mod items;
pub mod upload;
