//! HTTP handlers, grouped by API area.

pub mod speech;
