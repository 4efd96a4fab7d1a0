pub mod ledger_gap;
pub mod order;
pub mod order_item;
pub mod return_item;
pub mod return_request;
pub mod stock_record;
pub mod stock_transaction;
