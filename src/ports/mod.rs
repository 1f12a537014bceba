//! Port traits: the seams between the trading core and its collaborators.

pub mod config_port;
pub mod scoring_port;
pub mod venue_port;
