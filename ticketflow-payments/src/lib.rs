pub mod card;
pub mod controller;
pub mod gateway;
pub mod transfer;
pub mod worker;

pub use controller::{PaymentController, PaymentError};
pub use gateway::SimulatedGateway;
pub use worker::ConfirmationPoller;
