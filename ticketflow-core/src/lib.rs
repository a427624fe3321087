pub mod event;
pub mod gateway;
pub mod ledger;
pub mod payment;
pub mod sale;

pub use event::{EventPhase, EventValidationError, TicketEvent};
pub use gateway::{Authorization, GatewayError, PaymentGateway, TransferPoll};
pub use ledger::{LedgerError, LedgerStore, Versioned};
pub use payment::{CardDetails, Payment, PaymentMethod, PaymentStatus};
pub use sale::{Sale, SaleStatus};
