//! Everything that talks to, or rewrites URLs for, the tile/feature service
//! and the project metadata API.

pub mod capabilities;
pub mod catalog;
pub mod fetcher;
pub mod resolver;
pub mod url;
pub mod wms;
