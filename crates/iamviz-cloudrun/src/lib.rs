//! Cloud Run admin API access for cloudrun-iamviz: an HTTP implementation of
//! `CloudRunApi`, access-token providers backed by Application Default
//! Credentials or the gcloud login, and project inference.

pub mod adc;
pub mod auth;
pub mod client;
pub mod gcloud;
pub mod models;
pub mod project;

pub use adc::{AdcTokenProvider, CredentialsFile};
pub use auth::{
    default_token_provider, ChainedTokenProvider, GcloudTokenProvider, StaticToken, TokenProvider,
};
pub use client::CloudRunClient;
pub use gcloud::{GcloudCli, GcloudError};
pub use project::infer_project;
