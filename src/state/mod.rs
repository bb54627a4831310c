//! Persisted per-document progress

pub mod store;

pub use store::{
    checksum, DocumentState, FailureKind, LoadOutcome, PageFailure, PageState, PageStatus,
    ResumeInfo, StageResult, StateStore,
};
