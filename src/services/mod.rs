pub mod costing;
pub mod ledger;
pub mod orders;
pub mod reservations;
pub mod returns;

pub use costing::CostingService;
pub use ledger::LedgerService;
pub use orders::OrderFulfillmentService;
pub use reservations::ReservationService;
pub use returns::ReturnService;
