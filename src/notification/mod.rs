pub mod controller;
pub mod model;
pub mod producer;
pub mod service;
pub mod store;
