// # Kamailio Destination
//
// This crate provides the destination side of routesync for a Kamailio
// deployment:
//
// - `KamailioStore`: the MySQL database Kamailio reads its domain table from.
//   It implements `SourceDirectory`, `RoutingStore` and `StatusRecorder`.
// - `KamcmdReloader`: runs `kamcmd domain.reload` so Kamailio picks up the
//   rebuilt tables.
//
// ## Tables
//
// - `dsip_fusionpbx_db`: registered sources, their credentials and sync status
// - `dr_gateways`: gateway addresses, joined on `pbx_id = gwid`
// - `domain`: routable domains (unique on `domain`)
// - `domain_attrs`: `pbx_ip` attribute naming the source address of each domain
//
// ## Security Requirements
//
// - Database passwords NEVER appear in logs or `Debug` output

pub mod reload;
pub mod store;

pub use reload::KamcmdReloader;
pub use store::KamailioStore;
