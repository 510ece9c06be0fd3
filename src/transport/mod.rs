//! Delivery of report batches to the remote tracking service.
//!
//! This module provides the request wire format, response parsing and outcome
//! classification, and the HTTP client used by pipelines.

mod client;
pub mod response;
pub mod wire;

pub use client::{validate_endpoint, HttpReportClient, ReportClient, DEFAULT_TIMEOUT};
pub use response::{classify_response, parse_response, DeliveryOutcome, RemoteError, RemoteResponse};
pub use wire::{encode_batch, CameraReportRequest, WireReport};
