// Canonical entity identifiers
pub mod identity;

// Static fleet topology
pub mod topology;

// Status values and the freshness rule
pub mod reconcile;

// Entity store and per-entity merge
pub mod state;

// Inbound message routing
pub mod ingest;

// Periodic reachability checks
pub mod probe;

// Wall/segment category views
pub mod view;

// Outbound device commands
pub mod control;

// NATS transport
pub mod nats;

// HTTP API
pub mod api;

// Configuration
pub mod config;
