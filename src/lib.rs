//! vhost-tls - SNI virtual host certificate management
//!
//! This crate selects the TLS certificate to present for each handshake on
//! an endpoint that hosts many virtual hosts behind one socket, and reloads
//! the certificate set without disturbing handshakes in flight.

pub mod tls;
