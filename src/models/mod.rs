pub mod article;
pub mod rbac;
pub mod settings;
pub mod user;
