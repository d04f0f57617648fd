//! Core traits for the Mailgun provider
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`MailgunApi`]: Region-bound capability handle for the Mailgun REST API
//! - [`StateStore`]: Persistent observed state, keyed by resource address

pub mod mailgun_api;
pub mod state_store;

pub use mailgun_api::{
    ApiDnsRecord, ClientSet, CreateDomainOptions, Credential, DomainDetails, DomainInfo,
    DomainTracking, MailgunApi, MailgunApiFactory, Route, RouteOptions,
};
pub use state_store::{StateRecord, StateStore};
