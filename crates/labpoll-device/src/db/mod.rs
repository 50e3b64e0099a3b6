pub mod converter;
pub mod entity;

pub use entity::device;
