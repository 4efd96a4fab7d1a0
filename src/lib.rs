//! Inventory ledger and order-fulfillment core.
//!
//! Stock records, an append-only stock ledger, reservation management,
//! weighted-average costing, and the order and return state machines.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod queries;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared handle to the core: one per process, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub costing: services::CostingService,
    pub reservations: services::ReservationService,
    pub orders: services::OrderFulfillmentService,
    pub returns: services::ReturnService,
}

impl AppState {
    /// Wires every service against one connection and one event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let costing = services::CostingService::new(db.clone(), event_sender.clone());
        let reservations = services::ReservationService::new(db.clone(), event_sender.clone());
        let orders = services::OrderFulfillmentService::new(db.clone(), event_sender.clone());
        let returns = services::ReturnService::new(db.clone(), event_sender.clone());
        Self {
            db,
            config,
            event_sender,
            costing,
            reservations,
            orders,
            returns,
        }
    }
}
