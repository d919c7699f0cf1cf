pub mod client;
pub mod live;
pub mod model;
