//! HAZOP study core: risk scoring on the 5×5 matrix, persisted
//! assessments, similarity matching and "copy from previous".

pub mod access;
pub mod assessment;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod hierarchy;
pub mod rating;
pub mod reporting;
pub mod risk_engine;
pub mod similarity;
pub mod store;
pub mod types;
