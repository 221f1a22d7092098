pub mod base;
pub mod factory;
pub mod handle;
pub mod lifecycle;
pub mod registry;
pub mod street;
pub mod visibility;
