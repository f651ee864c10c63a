//! Domain model: reference data, payment obligations and the ports the
//! application layer talks to.

pub mod directory;
pub mod notification;
pub mod payment;
pub mod ports;
