//! # podflow-control
//!
//! Control-plane access and resource reconciliation.
//!
//! - [`ControlPlane`]: the RPC seam (list/create pods, endpoints, templates)
//! - [`GraphqlControlPlane`]: `reqwest` client for the GraphQL API
//! - [`Reconciler`]: find-or-create for the project's pod (with capacity
//!   fallback) and find-or-repoint for its serverless endpoint

#![deny(unsafe_code)]

pub mod client;
pub mod graphql;
pub mod reconcile;
pub mod types;

pub use client::ControlPlane;
pub use graphql::GraphqlControlPlane;
pub use reconcile::{DeployOutcome, Reconciler};
pub use types::{
    CreateEndpointInput, CreatePodInput, CreateTemplateInput, Endpoint, Pod, PodEnv, PodRuntime,
    PortMapping,
};
