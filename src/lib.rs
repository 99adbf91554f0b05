//! Shows a remote list of cities as pins on an interactive map, filtered by a
//! docked search box, with an optional "you are here" pin.

pub mod city;
pub mod config;
pub mod filter;
pub mod geolocation;
pub mod gui;
pub mod loader;
pub mod pending;
pub mod popup;
pub mod scene;
pub mod sdk;
pub mod session;
pub mod store;
pub mod sync;
