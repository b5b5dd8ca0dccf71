// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod ai;
pub mod api;
pub mod collect;
pub mod config;
pub mod console;
pub mod crawl;
pub mod error;
pub mod leader;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod scheduler;
pub mod store;

pub use crate::api::{create_router, AppState};
pub use crate::collect::{Collector, TickReport};
pub use crate::console::Console;
pub use crate::crawl::{Dispatcher, Strategy};
pub use crate::store::{SqliteStore, Store};
