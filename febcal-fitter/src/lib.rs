//! The calibration engine
//!
//! Requests arrive as json over a 0MQ PULL socket, the 
//! results (or "ERR") leave through a PUSH socket. Several 
//! fitters can share the work behind a balancer. The
//! campaign module drives whole boards through the fitters
//! and turns their gains into bias settings.

#[macro_use] extern crate log;

pub mod service;
pub mod balancer;
pub mod campaign;

pub use service::{handle_request,
                  CalibrationService};
pub use balancer::{Balancer,
                   BalancerEndpoints,
                   stop_fitters};
