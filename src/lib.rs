pub mod config;
pub mod diff;
pub mod engine;
pub mod gateway;
pub mod model;
pub mod normalize;
pub mod schedule;
pub mod selection;
pub mod session;
pub mod shared;
pub mod visibility;
