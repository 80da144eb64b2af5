//! Conformance tests for backend drivers and codecs.
//!
//! A backend proves it implements the driver contract by passing every
//! [`Scenario`] against collections produced by its [`Harness`]. The
//! scenarios only use the public [`Collection`] API, so they make no
//! assumptions about how a backend stores data.
//!
//! Backends with a native value encoding also supply a [`CodecTester`],
//! which shows that the native and portable encodings can read each other's
//! output.
//!
//! # Example
//!
//! ```ignore
//! use helios_docstore::conformance::{self, Harness, HarnessMaker, NoCodecTester};
//!
//! #[tokio::test]
//! async fn my_backend_conforms() {
//!     let report =
//!         conformance::run_conformance_tests(&MyHarnessMaker, None::<&NoCodecTester>).await;
//!     report.assert_success();
//! }
//! ```

mod check;
mod codec;
mod scenarios;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::context::Context;
use crate::core::{Collection, Driver};
use crate::error::{DocstoreResult, ValidationError};

pub use codec::codec;
pub use scenarios::{
    batch_ordering, cancellation, create, data, delete, get, get_projection, put, replace, update,
};

/// Produces collections for one conformance run.
#[async_trait]
pub trait Harness: Send + Sync {
    /// Makes a fresh, empty collection.
    async fn make_collection(&self, ctx: &Context) -> DocstoreResult<Box<dyn Driver>>;

    /// Releases resources held by the harness.
    async fn close(&self) -> DocstoreResult<()> {
        Ok(())
    }
}

/// Builds a new [`Harness`] for each scenario.
#[async_trait]
pub trait HarnessMaker: Send + Sync {
    async fn make_harness(&self, ctx: &Context) -> DocstoreResult<Box<dyn Harness>>;
}

/// Value shapes a native codec may declare it cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnsupportedType {
    /// Unsigned integers.
    Uint,
    /// Complex numbers.
    Complex,
    /// Fixed-size arrays.
    Arrays,
    /// Times with sub-millisecond precision. Times are then expected to
    /// round to the nearest millisecond.
    NanosecondTimes,
}

/// Encodes and decodes values with both a backend's native codec and the
/// portable codec.
pub trait CodecTester: Send + Sync {
    /// The backend's native representation of a document.
    type Native;

    fn unsupported_types(&self) -> Vec<UnsupportedType>;

    fn native_encode<T: Serialize>(&self, value: &T) -> DocstoreResult<Self::Native>;

    fn native_decode<T: DeserializeOwned>(&self, native: &Self::Native) -> DocstoreResult<T>;

    fn docstore_encode<T: Serialize>(&self, value: &T) -> DocstoreResult<Self::Native>;

    fn docstore_decode<T: DeserializeOwned>(&self, native: &Self::Native) -> DocstoreResult<T>;
}

/// Placeholder for backends without a native codec; its methods always
/// fail. Pass `None::<&NoCodecTester>` to skip the codec scenario.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCodecTester;

impl NoCodecTester {
    fn unsupported<T>() -> DocstoreResult<T> {
        Err(ValidationError::Unsupported {
            backend_name: "none".to_string(),
            operation: "codec".to_string(),
        }
        .into())
    }
}

impl CodecTester for NoCodecTester {
    type Native = ();

    fn unsupported_types(&self) -> Vec<UnsupportedType> {
        Vec::new()
    }

    fn native_encode<T: Serialize>(&self, _value: &T) -> DocstoreResult<()> {
        Self::unsupported()
    }

    fn native_decode<T: DeserializeOwned>(&self, _native: &()) -> DocstoreResult<T> {
        Self::unsupported()
    }

    fn docstore_encode<T: Serialize>(&self, _value: &T) -> DocstoreResult<()> {
        Self::unsupported()
    }

    fn docstore_decode<T: DeserializeOwned>(&self, _native: &()) -> DocstoreResult<T> {
        Self::unsupported()
    }
}

/// A failed conformance check.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{scenario}: {message}")]
pub struct ConformanceFailure {
    pub scenario: String,
    pub message: String,
}

impl ConformanceFailure {
    pub fn new(scenario: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            message: message.into(),
        }
    }
}

/// The collection scenarios, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Create,
    Put,
    Replace,
    Get,
    GetProjection,
    Delete,
    Update,
    Data,
    BatchOrdering,
    Cancellation,
}

impl Scenario {
    pub const ALL: [Scenario; 10] = [
        Scenario::Create,
        Scenario::Put,
        Scenario::Replace,
        Scenario::Get,
        Scenario::GetProjection,
        Scenario::Delete,
        Scenario::Update,
        Scenario::Data,
        Scenario::BatchOrdering,
        Scenario::Cancellation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Create => "create",
            Scenario::Put => "put",
            Scenario::Replace => "replace",
            Scenario::Get => "get",
            Scenario::GetProjection => "get_projection",
            Scenario::Delete => "delete",
            Scenario::Update => "update",
            Scenario::Data => "data",
            Scenario::BatchOrdering => "batch_ordering",
            Scenario::Cancellation => "cancellation",
        }
    }

    /// Runs the scenario against `coll`.
    pub async fn run(&self, coll: &Collection) -> Result<(), ConformanceFailure> {
        match self {
            Scenario::Create => create(coll).await,
            Scenario::Put => put(coll).await,
            Scenario::Replace => replace(coll).await,
            Scenario::Get => get(coll).await,
            Scenario::GetProjection => get_projection(coll).await,
            Scenario::Delete => delete(coll).await,
            Scenario::Update => update(coll).await,
            Scenario::Data => data(coll).await,
            Scenario::BatchOrdering => batch_ordering(coll).await,
            Scenario::Cancellation => cancellation(coll).await,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Runs one scenario on a collection from a fresh harness, closing both
/// afterwards.
pub async fn with_collection(
    maker: &dyn HarnessMaker,
    scenario: Scenario,
) -> Result<(), ConformanceFailure> {
    let ctx = Context::background();
    let setup = |e: crate::error::DocstoreError| {
        ConformanceFailure::new(scenario.name(), format!("setup failed: {}", e))
    };

    let harness = maker.make_harness(&ctx).await.map_err(setup)?;
    let result = match harness.make_collection(&ctx).await {
        Ok(driver) => {
            let coll = Collection::new(driver);
            let result = scenario.run(&coll).await;
            if let Err(e) = coll.close().await {
                tracing::warn!(scenario = scenario.name(), "closing collection failed: {}", e);
            }
            result
        }
        Err(e) => Err(setup(e)),
    };
    if let Err(e) = harness.close().await {
        tracing::warn!(scenario = scenario.name(), "closing harness failed: {}", e);
    }
    result
}

/// Outcome of one scenario.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed,
    Failed(ConformanceFailure),
    Skipped(String),
}

/// Results of a full conformance run.
#[derive(Debug, Clone, Default)]
pub struct ConformanceReport {
    results: Vec<(String, Outcome)>,
}

impl ConformanceReport {
    fn record(&mut self, name: &str, result: Result<(), ConformanceFailure>) {
        let outcome = match result {
            Ok(()) => Outcome::Passed,
            Err(failure) => Outcome::Failed(failure),
        };
        self.results.push((name.to_string(), outcome));
    }

    pub fn results(&self) -> &[(String, Outcome)] {
        &self.results
    }

    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.results
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> Vec<&ConformanceFailure> {
        self.results
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                Outcome::Failed(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    /// Panics with every failure message if any scenario failed.
    pub fn assert_success(&self) {
        let failures = self.failures();
        if !failures.is_empty() {
            let messages: Vec<String> = failures.iter().map(ToString::to_string).collect();
            panic!("conformance failures:\n{}", messages.join("\n"));
        }
    }
}

/// Runs every scenario, then the codec checks if a tester is given.
pub async fn run_conformance_tests<C: CodecTester>(
    maker: &dyn HarnessMaker,
    codec_tester: Option<&C>,
) -> ConformanceReport {
    let mut report = ConformanceReport::default();
    for scenario in Scenario::ALL {
        let result = with_collection(maker, scenario).await;
        match &result {
            Ok(()) => tracing::debug!(scenario = scenario.name(), "conformance scenario passed"),
            Err(e) => {
                tracing::warn!(scenario = scenario.name(), "conformance scenario failed: {}", e)
            }
        }
        report.record(scenario.name(), result);
    }

    match codec_tester {
        Some(ct) => report.record("codec", codec(ct)),
        None => report
            .results
            .push(("codec".to_string(), Outcome::Skipped("no codec tester".to_string()))),
    }
    report
}
