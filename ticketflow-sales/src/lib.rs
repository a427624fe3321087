pub mod controller;

pub use controller::{NewSale, SaleController, SaleError, MAX_TICKETS_PER_SALE};
